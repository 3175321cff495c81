// SPDX-License-Identifier: Apache-2.0
//! Repository names follow the distribution spec:
//! https://github.com/opencontainers/distribution-spec/blob/master/spec.md#overview
//! 1. A repository name is broken up into path components.
//! 2. A component of a repository name MUST begin with one or more lowercase alpha-numeric characters.
//! 3. Subsequent lowercase alpha-numeric characters are OPTIONAL and MAY be separated by periods, dashes or underscores.
//! More strictly, it MUST match the regular expression [a-z0-9]+(?:[._-][a-z0-9]+)*.
use std::fmt;
use lazy_static::lazy_static;
use regex::Regex;

use serde::{Deserialize, Serialize};
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;

lazy_static! {
    static ref REGEX_COMPONENT: Regex = Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").unwrap();
    static ref REGEX_TAG: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").unwrap();
}

const MAX_NAME_LENGTH: usize = 255;

/// Validated repository name, e.g. `library/nginx`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoName {
    // This is the whole name(space)
    name: String,

    // This is the parsed namespace
    components: Vec<String>,
}

impl RepoName {
    /// Parse and validate a repository name
    pub fn parse(name: &str) -> Result<RepoName, RegistryError> {
        // check that the maximum amount of chars for the name is 255
        if name.len() > MAX_NAME_LENGTH {
            return Err(RegistryError::new(ErrorKind::RegistryNameInvalid)
                .with_context("invalid repository name")
                .with_error(format!(
                    "Repository name max length should be less than 255 chars - we got: {}",
                    name.len()
                )));
        }

        // split the repository name into components via the: `/` char
        let components = name
            .split('/')
            .map(String::from)
            .collect::<Vec<String>>();

        // verify now that each component is valid
        for component in &components {
            // if it does not match then return an error!
            if !REGEX_COMPONENT.is_match(component) {
                return Err(RegistryError::new(ErrorKind::RegistryNameInvalid)
                    .with_context("invalid repository name")
                    .with_error(format!("Repository component is invalid: {}", &name)));
            }
        }

        Ok(RepoName {
            name: name.to_string(),
            components,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Mutable label pointing at a manifest
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn parse(tag: &str) -> Result<Tag, RegistryError> {
        if !REGEX_TAG.is_match(tag) {
            return Err(RegistryError::new(ErrorKind::RegistryTagInvalid)
                .with_context("invalid tag")
                .with_error(format!("Tag is invalid: {}", tag)));
        }
        Ok(Tag(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use crate::error::error_kind::ErrorKind;
    use super::{RepoName, Tag};

    #[test]
    fn repository_basic_test() {
        let repo_name = String::from("library/nginx");
        let repo = RepoName::parse(&repo_name).expect(&*format!("Failed to parse repo: {}", &repo_name));
        assert_eq!(2, repo.components().len());
        assert_eq!("library", repo.components()[0]);
        assert_eq!("nginx", repo.components()[1]);
        assert_eq!(repo_name, repo.as_str());
    }

    #[test]
    fn repository_single_component_test() {
        let repo = RepoName::parse("my-alpine").expect("Failed to parse repo");
        assert_eq!(1, repo.components().len());
        assert_eq!("my-alpine", repo.to_string());
    }

    #[test]
    fn repository_basic_with_slash_prefix_test() {
        let repo = RepoName::parse("/library");
        assert!(
            repo.is_err(),
            "repo should not start with a forward slash /"
        );
    }

    #[test]
    fn repository_complex_test() {
        let repo = RepoName::parse("lib/crane/reg/test/amd64/nginx");
        assert!(repo.is_ok(), "complex repo should be parsed fine");
        let repo = repo.unwrap();
        assert_eq!(6, repo.components().len());
        assert_eq!("lib", repo.components()[0]);
        assert_eq!("nginx", repo.components()[5]);
    }

    #[test]
    fn repository_invalid_components_test() {
        for name in ["lib/crane/reg/test rust/amd64/nginx", "Library/nginx", "lib//nginx", "nginx-", "a..b", ""] {
            let err = RepoName::parse(name).expect_err(name);
            assert_eq!(ErrorKind::RegistryNameInvalid, err.kind);
        }
    }

    #[test]
    fn repository_too_long_test() {
        let name = "a".repeat(256);
        assert!(RepoName::parse(&name).is_err());
    }

    #[test]
    fn tag_test() {
        for tag in ["1", "latest", "unstable-20200803-slim", "_v1.0", "A".repeat(128).as_str()] {
            assert_eq!(tag, Tag::parse(tag).expect(tag).as_str());
        }

        for tag in ["", ".hidden", "-dash", "with space", "a:b", "A".repeat(129).as_str()] {
            let err = Tag::parse(tag).expect_err(tag);
            assert_eq!(ErrorKind::RegistryTagInvalid, err.kind);
        }
    }
}
