//! User administration statement generation.
//!
//! Builders for the `CREATE USER` / `ALTER USER` batches a warehouse admin
//! runs day to day. These produce statement text only; whether to execute or
//! just display the batch is the caller's choice, since admins routinely
//! review user DDL before running it.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

/// Password characters the warehouse rejects: quotes, backslash, slash, `@`
/// and space.
const INVALID_PASSWORD_CHARS: &[u8] = br#"\/'"@ "#;

/// Return a strong password valid for the warehouse.
///
/// Constraints:
/// * 8 to 64 characters in length.
/// * Must contain at least one uppercase letter, one lowercase letter, and
///   one number.
/// * Can use any printable ASCII character except `'`, `"`, `\`, `/`, `@`,
///   or space.
///
/// `length` is clamped into the valid 8..=64 window.
pub fn random_password(length: usize) -> String {
    let length = length.clamp(8, 64);

    let valid: Vec<char> = (33u8..=126)
        .filter(|b| !INVALID_PASSWORD_CHARS.contains(b))
        .map(char::from)
        .collect();
    let upper: Vec<char> = ('A'..='Z').collect();
    let lower: Vec<char> = ('a'..='z').collect();
    let digits: Vec<char> = ('0'..='9').collect();

    let mut rng = OsRng;
    let mut chars: Vec<char> = vec![
        *upper.choose(&mut rng).unwrap_or(&'A'),
        *lower.choose(&mut rng).unwrap_or(&'a'),
        *digits.choose(&mut rng).unwrap_or(&'0'),
    ];
    for _ in 0..length - 3 {
        chars.push(*valid.choose(&mut rng).unwrap_or(&'x'));
    }
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

/// Options for a new user account.
#[derive(Debug, Clone, Default)]
pub struct CreateUserOptions {
    /// Allow the new account to create databases
    pub createdb: bool,
    /// Create a superuser with all database privileges
    pub createuser: bool,
    /// Existing groups the user will belong to
    pub groups: Vec<String>,
    /// Absolute time after which the password is no longer valid
    pub valid_until: Option<String>,
    /// Configuration parameters set through follow-up `ALTER USER`
    /// statements; `None` values reset the parameter
    pub parameters: Vec<(String, Option<String>)>,
}

/// Changes to apply to an existing user account.
#[derive(Debug, Clone, Default)]
pub struct AlterUserOptions {
    pub password: Option<String>,
    pub createdb: Option<bool>,
    pub createuser: Option<bool>,
    /// New name to assign the user
    pub rename: Option<String>,
    pub valid_until: Option<String>,
    pub parameters: Vec<(String, Option<String>)>,
}

/// Return the SQL batch defining a new user account.
pub fn create_user_statement(name: &str, password: &str, options: &CreateUserOptions) -> String {
    let mut statement = format!("CREATE USER {name}");
    if options.createdb {
        statement.push_str(" CREATEDB");
    }
    if options.createuser {
        statement.push_str(" CREATEUSER");
    }
    if !options.groups.is_empty() {
        statement.push_str(" IN GROUP ");
        statement.push_str(&options.groups.join(", "));
    }
    statement.push_str(&format!(" PASSWORD '{}'", escape_literal(password)));
    if let Some(valid_until) = &options.valid_until {
        statement.push_str(&format!(" VALID UNTIL '{}'", escape_literal(valid_until)));
    }
    if !options.parameters.is_empty() {
        let alter = alter_user_statement(
            name,
            &AlterUserOptions {
                parameters: options.parameters.clone(),
                ..AlterUserOptions::default()
            },
        );
        statement.push_str(";\n");
        statement.push_str(&alter);
    }
    statement
}

/// Return a SQL statement altering an existing user account.
pub fn alter_user_statement(name: &str, options: &AlterUserOptions) -> String {
    let mut clauses = Vec::new();
    if let Some(password) = &options.password {
        clauses.push(format!("PASSWORD '{}'", escape_literal(password)));
    }
    if let Some(createdb) = options.createdb {
        clauses.push(if createdb { "CREATEDB" } else { "NOCREATEDB" }.to_string());
    }
    if let Some(createuser) = options.createuser {
        clauses.push(if createuser { "CREATEUSER" } else { "NOCREATEUSER" }.to_string());
    }
    if let Some(valid_until) = &options.valid_until {
        clauses.push(format!("VALID UNTIL '{}'", escape_literal(valid_until)));
    }
    if let Some(rename) = &options.rename {
        clauses.push(format!("RENAME TO {rename}"));
    }
    for (parameter, value) in &options.parameters {
        match value {
            Some(value) => clauses.push(format!("SET {parameter} = {value}")),
            None => clauses.push(format!("RESET {parameter}")),
        }
    }
    format!("ALTER USER {name} {}", clauses.join(" "))
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
