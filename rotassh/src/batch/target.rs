//! Targets and credential records.

use std::fmt;
use std::fs;
use std::path::Path;

use log::debug;
use secrecy::SecretString;

use crate::error::InputError;

/// One unit of work: change `username`'s password on `host`.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub username: String,
    pub password: SecretString,
    pub new_password: SecretString,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.host)
    }
}

/// One credential line: a user, both passwords and the hosts to apply them on.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub username: String,
    pub password: SecretString,
    pub new_password: SecretString,
    pub hosts: Vec<String>,
}

impl CredentialRecord {
    /// Build a record from `username password new_password [hosts]` fields.
    ///
    /// `default_hosts` is used when the hosts field is absent.
    pub fn from_fields<S: AsRef<str>>(
        fields: &[S],
        default_hosts: &[String],
    ) -> Result<Self, InputError> {
        if !(3..=4).contains(&fields.len()) {
            return Err(InputError::FieldCount {
                fields: fields.len(),
            });
        }

        let hosts = match fields.get(3) {
            Some(hosts) => split_hosts(hosts.as_ref()),
            None => default_hosts.to_vec(),
        };
        if hosts.is_empty() {
            return Err(InputError::MissingHosts);
        }

        Ok(Self {
            username: fields[0].as_ref().to_string(),
            password: SecretString::from(fields[1].as_ref().to_string()),
            new_password: SecretString::from(fields[2].as_ref().to_string()),
            hosts,
        })
    }

    /// Expand into one target per host, in host order.
    pub fn targets(&self) -> impl Iterator<Item = Target> + '_ {
        self.hosts.iter().map(|host| Target {
            host: host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            new_password: self.new_password.clone(),
        })
    }
}

/// A credential record, or the reason it could not be built, with its origin.
#[derive(Debug)]
pub struct CredentialEntry {
    /// 1-based line number, when read from a file.
    pub line: Option<usize>,
    pub record: Result<CredentialRecord, InputError>,
}

/// Split a comma separated host list, ignoring empty entries.
pub fn split_hosts(hosts: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(String::from)
        .collect()
}

/// Parse one credential line.
///
/// Returns `None` for blank lines and `#` comments.
pub fn parse_line(line: &str, default_hosts: &[String]) -> Option<Result<CredentialRecord, InputError>> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    Some(CredentialRecord::from_fields(&fields, default_hosts))
}

/// Parse a whole credential file's contents, skipping blank and comment lines.
pub fn parse_credentials(contents: &str, default_hosts: &[String]) -> Vec<CredentialEntry> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line_no = index + 1;
            match parse_line(line, default_hosts) {
                Some(record) => Some(CredentialEntry {
                    line: Some(line_no),
                    record,
                }),
                None => {
                    debug!("Skipping line #{}", line_no);
                    None
                }
            }
        })
        .collect()
}

/// Read and parse a credential file.
pub fn read_credentials(
    path: &Path,
    default_hosts: &[String],
) -> Result<Vec<CredentialEntry>, InputError> {
    let contents = fs::read_to_string(path).map_err(|source| InputError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_credentials(&contents, default_hosts))
}
