//! Bulk-load credential resolution.
//!
//! The warehouse reads staged objects directly from object storage, so every
//! `COPY` statement carries a credentials string. Two encodings exist: an IAM
//! role the cluster assumes, or explicit access keys with an optional
//! temporary session token. When both are configured the role wins.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WharfError};

/// Credentials the warehouse uses to read staged objects during a bulk load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwsCredentials {
    /// Explicit access keys, with an optional STS session token
    KeySecret {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
    /// An IAM role assumed by the warehouse cluster
    IamRole {
        account_id: String,
        role_name: String,
    },
}

impl AwsCredentials {
    /// Resolve one credential value from the available fields.
    ///
    /// Role fields take precedence over explicit keys. Both members of a
    /// pair must be present together; anything else is an input error.
    pub fn resolve(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        session_token: Option<String>,
        account_id: Option<String>,
        role_name: Option<String>,
    ) -> Result<Self> {
        match (account_id, role_name) {
            (Some(account_id), Some(role_name)) => Ok(AwsCredentials::IamRole {
                account_id,
                role_name,
            }),
            (Some(_), None) | (None, Some(_)) => Err(WharfError::InvalidRequest(
                "both an AWS account id and a role name are required to use an IAM role"
                    .to_string(),
            )),
            (None, None) => match (access_key_id, secret_access_key) {
                (Some(access_key_id), Some(secret_access_key)) => Ok(AwsCredentials::KeySecret {
                    access_key_id,
                    secret_access_key,
                    session_token,
                }),
                _ => Err(WharfError::InvalidRequest(
                    "an access key id and secret access key are required when no IAM role is set"
                        .to_string(),
                )),
            },
        }
    }

    /// Resolve credentials from the environment.
    ///
    /// Reads `AWS_ACCOUNT_ID` / `AWS_IAM_ROLE_NAME` for the role form and
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` for explicit keys. Both
    /// `AWS_SECURITY_TOKEN` and its successor `AWS_SESSION_TOKEN` are
    /// honored for the temporary token.
    pub fn from_env() -> Result<Self> {
        let session_token = env::var("AWS_SECURITY_TOKEN")
            .or_else(|_| env::var("AWS_SESSION_TOKEN"))
            .ok();
        Self::resolve(
            env::var("AWS_ACCESS_KEY_ID").ok(),
            env::var("AWS_SECRET_ACCESS_KEY").ok(),
            session_token,
            env::var("AWS_ACCOUNT_ID").ok(),
            env::var("AWS_IAM_ROLE_NAME").ok(),
        )
    }

    /// Render the exact credentials string the bulk-load statement embeds.
    pub fn copy_credentials(&self) -> String {
        match self {
            AwsCredentials::IamRole {
                account_id,
                role_name,
            } => format!("aws_iam_role=arn:aws:iam::{account_id}:role/{role_name}"),
            AwsCredentials::KeySecret {
                access_key_id,
                secret_access_key,
                session_token,
            } => {
                let mut creds = format!(
                    "aws_access_key_id={access_key_id};aws_secret_access_key={secret_access_key}"
                );
                if let Some(token) = session_token {
                    creds.push_str(";token=");
                    creds.push_str(token);
                }
                creds
            }
        }
    }
}
