// SPDX-License-Identifier: Apache-2.0
use http_auth::parser::ChallengeParser;
use http_auth::ChallengeRef;

/// Authentication challenge of a `WWW-Authenticate` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic {
        realm: Option<String>,
    },
}

impl Challenge {
    /// The first challenge of the header we can answer: `Bearer` with a realm, or `Basic`.
    /// A header that does not follow the challenge grammar gives nothing.
    pub fn parse(header: &str) -> Option<Challenge> {
        ChallengeParser::new(header)
            .filter_map(|challenge| challenge.ok())
            .find_map(|challenge| Challenge::try_from(&challenge).ok())
    }
}

impl TryFrom<&ChallengeRef<'_>> for Challenge {
    type Error = String;

    fn try_from(challenge: &ChallengeRef<'_>) -> Result<Self, Self::Error> {
        let param = |name: &str| challenge.params.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.to_unescaped());

        if challenge.scheme.eq_ignore_ascii_case("bearer") {
            return Ok(Challenge::Bearer {
                realm: param("realm").ok_or("bearer challenge without realm")?,
                service: param("service"),
                scope: param("scope"),
            });
        }

        if challenge.scheme.eq_ignore_ascii_case("basic") {
            return Ok(Challenge::Basic {
                realm: param("realm"),
            });
        }

        Err(format!("unsupported challenge scheme {}", challenge.scheme))
    }
}
