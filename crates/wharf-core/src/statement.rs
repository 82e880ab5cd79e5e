//! Bulk-load statement generation.
//!
//! One `COPY` statement is generated per manifest document. The credentials
//! string comes straight from [`crate::credentials::AwsCredentials`]; the
//! format clauses differ between CSV-shaped and JSON-shaped input.

use crate::credentials::AwsCredentials;

/// Format-specific clauses of a bulk-load statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyFormat {
    /// Quoted, gzip-compressed CSV chunks
    Csv,
    /// Newline-delimited JSON chunks mapped through an uploaded field-mapping
    /// document
    Json {
        /// Full URL of the uploaded jsonpaths document
        jsonpaths_url: String,
    },
}

/// A renderable bulk-load statement for one manifest.
#[derive(Debug, Clone)]
pub struct CopyStatement {
    destination_table: String,
    manifest_url: String,
    credentials: String,
    format: CopyFormat,
}

impl CopyStatement {
    pub fn new(
        destination_table: impl Into<String>,
        manifest_url: impl Into<String>,
        credentials: &AwsCredentials,
        format: CopyFormat,
    ) -> Self {
        Self {
            destination_table: destination_table.into(),
            manifest_url: manifest_url.into(),
            credentials: credentials.copy_credentials(),
            format,
        }
    }

    /// Render the statement text submitted to the warehouse executor.
    pub fn render(&self) -> String {
        let mut statement = format!(
            "COPY {table}\nFROM '{manifest}'\nCREDENTIALS '{creds}'\n",
            table = self.destination_table,
            manifest = self.manifest_url,
            creds = self.credentials,
        );
        match &self.format {
            CopyFormat::Csv => {
                statement.push_str("MANIFEST\nCSV\nGZIP");
            }
            CopyFormat::Json { jsonpaths_url } => {
                statement.push_str(&format!(
                    "JSON '{jsonpaths_url}'\nMANIFEST\nGZIP\nTIMEFORMAT 'auto'"
                ));
            }
        }
        statement
    }
}
