use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DocketError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Separator between account id and project id in a composite project id.
pub const PROJECT_ID_SEPARATOR: char = '#';

/// `accountId#projectId`, the unit of authorization scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeProjectId {
    account_id: String,
    project_id: String,
}

impl CompositeProjectId {
    /// Split a composite id. Both halves must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, DocketError> {
        let Some((account, project)) = raw.split_once(PROJECT_ID_SEPARATOR) else {
            return Err(DocketError::Validation(format!(
                "project id '{raw}' is missing the '{PROJECT_ID_SEPARATOR}' account separator"
            )));
        };
        let (account, project) = (account.trim(), project.trim());
        if account.is_empty() || project.is_empty() {
            return Err(DocketError::Validation(format!(
                "project id '{raw}' must name both an account and a project"
            )));
        }
        Ok(Self {
            account_id: account.to_string(),
            project_id: project.to_string(),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl fmt::Display for CompositeProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.account_id, PROJECT_ID_SEPARATOR, self.project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_account_and_project() {
        let id = CompositeProjectId::parse("acct1#proj1").unwrap();
        assert_eq!(id.account_id(), "acct1");
        assert_eq!(id.project_id(), "proj1");
        assert_eq!(id.to_string(), "acct1#proj1");
    }

    #[rstest]
    #[case::no_separator("proj1")]
    #[case::empty_account("#proj1")]
    #[case::empty_project("acct1#")]
    #[case::blank("  #  ")]
    fn rejects_malformed_ids(#[case] raw: &str) {
        let err = CompositeProjectId::parse(raw).unwrap_err();
        assert!(matches!(err, DocketError::Validation(_)));
    }

    #[test]
    fn only_the_first_separator_splits() {
        let id = CompositeProjectId::parse("acct#proj#v2").unwrap();
        assert_eq!(id.project_id(), "proj#v2");
    }
}
