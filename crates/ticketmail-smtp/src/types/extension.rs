//! EHLO capability keywords.

/// A capability advertised in one EHLO reply line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `STARTTLS`.
    StartTls,
    /// `AUTH` with the mechanisms this client can use.
    Auth(Vec<AuthMechanism>),
    /// `SIZE`, with the limit in bytes when one is given.
    Size(Option<usize>),
    /// `8BITMIME`.
    EightBitMime,
    /// Anything else, kept verbatim.
    Unknown(String),
}

impl Extension {
    /// Parses one EHLO line (code and separator already stripped).
    ///
    /// Accepts the pre-standard `AUTH=LOGIN PLAIN` spelling some relays
    /// still send.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let (keyword, args) = trimmed
            .split_once(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or((trimmed, ""));

        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(mechanisms(args)),
            "SIZE" => Self::Size(args.trim().parse().ok()),
            "8BITMIME" => Self::EightBitMime,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

fn mechanisms(args: &str) -> Vec<AuthMechanism> {
    args.split_whitespace()
        .filter_map(AuthMechanism::parse)
        .collect()
}

/// SASL mechanisms the session can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// `PLAIN`, credentials in the initial response.
    Plain,
    /// `LOGIN`, username and password in two challenges.
    Login,
}

impl AuthMechanism {
    /// Parses a mechanism name, ignoring case. Unsupported names give `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("PLAIN") {
            Some(Self::Plain)
        } else if name.eq_ignore_ascii_case("LOGIN") {
            Some(Self::Login)
        } else {
            None
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn relay_capabilities() {
        let lines = ["relay.test", "8BITMIME", "starttls", "SIZE 10240000", "ENHANCEDSTATUSCODES"];
        let parsed: Vec<Extension> = lines[1..].iter().map(|line| Extension::parse(line)).collect();
        assert_eq!(
            parsed,
            vec![
                Extension::EightBitMime,
                Extension::StartTls,
                Extension::Size(Some(10_240_000)),
                Extension::Unknown("ENHANCEDSTATUSCODES".into()),
            ]
        );
    }

    #[test]
    fn auth_keeps_only_usable_mechanisms() {
        assert_eq!(
            Extension::parse("AUTH CRAM-MD5 login XOAUTH2 PLAIN"),
            Extension::Auth(vec![AuthMechanism::Login, AuthMechanism::Plain])
        );
        assert_eq!(
            Extension::parse("AUTH=LOGIN"),
            Extension::Auth(vec![AuthMechanism::Login])
        );
        assert_eq!(Extension::parse("AUTH"), Extension::Auth(Vec::new()));
    }

    #[test]
    fn size_without_limit() {
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
    }
}
