//! Job identifier parsing
//!
//! Accepted forms: `123`, `123.server`, `123.server:port` and
//! `123.parent@server:port`. The part after `@` (or after the first `.`
//! when there is no `@`) names the server that owns the job.

use thiserror::Error;

/// Port assumed when a server is named without one
pub const DEFAULT_PORT: u16 = 15001;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JobIdError {
    #[error("illegally formed job identifier: {0}")]
    Malformed(String),

    #[error("both job ids must specify the same server")]
    ServerMismatch,
}

/// A parsed job identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdent {
    /// Id as sent to the server
    pub id: String,
    /// Owning server, when the identifier names one
    pub server: Option<String>,
}

/// Whether `text` looks like a job id rather than a destination name
pub fn is_job_id(text: &str) -> bool {
    text.trim_start_matches(' ')
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
}

pub fn parse_job_id(text: &str) -> Result<JobIdent, JobIdError> {
    let text = text.trim();
    if !is_job_id(text) {
        return Err(JobIdError::Malformed(text.to_string()));
    }

    let (id, server) = match text.split_once('@') {
        Some((id, server)) => (id, Some(server)),
        None => (text, text.split_once('.').map(|(_, server)| server)),
    };
    if id.is_empty() || server.is_some_and(str::is_empty) {
        return Err(JobIdError::Malformed(text.to_string()));
    }

    Ok(JobIdent {
        id: id.to_string(),
        server: server.map(str::to_string),
    })
}

/// Append the default port when `server` has none
pub fn with_default_port(server: &str) -> String {
    if server.contains(':') {
        server.to_string()
    } else {
        format!("{}:{}", server, DEFAULT_PORT)
    }
}

/// Server both jobs of a reorder live on; `None` when neither names one
pub fn common_server(first: &JobIdent, second: &JobIdent) -> Result<Option<String>, JobIdError> {
    let first = first.server.as_deref().map(with_default_port);
    let second = second.server.as_deref().map(with_default_port);
    match (first, second) {
        (Some(a), Some(b)) if a != b => Err(JobIdError::ServerMismatch),
        (a, b) => Ok(a.or(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_job_id() {
        assert!(is_job_id("123"));
        assert!(is_job_id("  42.svr"));
        assert!(!is_job_id("workq"));
        assert!(!is_job_id("@svr"));
        assert!(!is_job_id(""));
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            parse_job_id("123").unwrap(),
            JobIdent {
                id: "123".into(),
                server: None
            }
        );
        assert_eq!(
            parse_job_id("123.svr:15001").unwrap(),
            JobIdent {
                id: "123.svr:15001".into(),
                server: Some("svr:15001".into())
            }
        );
        assert_eq!(
            parse_job_id("123.head@svr2").unwrap(),
            JobIdent {
                id: "123.head".into(),
                server: Some("svr2".into())
            }
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(parse_job_id("workq"), Err(JobIdError::Malformed(_))));
        assert!(matches!(parse_job_id("123@"), Err(JobIdError::Malformed(_))));
        assert!(matches!(parse_job_id("123."), Err(JobIdError::Malformed(_))));
    }

    #[test]
    fn test_common_server() {
        let a = parse_job_id("1.svr").unwrap();
        let b = parse_job_id("2.svr:15001").unwrap();
        let c = parse_job_id("3.other").unwrap();
        let bare = parse_job_id("4").unwrap();

        assert_eq!(common_server(&a, &b).unwrap().as_deref(), Some("svr:15001"));
        assert_eq!(common_server(&bare, &c).unwrap().as_deref(), Some("other:15001"));
        assert_eq!(common_server(&bare, &bare).unwrap(), None);
        assert_eq!(common_server(&a, &c), Err(JobIdError::ServerMismatch));
    }
}
