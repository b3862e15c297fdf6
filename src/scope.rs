use std::fmt;

/// Slug naming one task of the bot, e.g. `reddiscparser`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TaskSlug(String);

impl TaskSlug {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskSlug {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("task slug must not be empty".to_string());
        }
        // The slug becomes both a directory name and a wiki subpage segment.
        if trimmed.contains('/') || trimmed == "." || trimmed == ".." {
            return Err(format!(
                "task slug must be a single path segment (got {:?})",
                trimmed
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<&str> for TaskSlug {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl fmt::Display for TaskSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either the whole bot account or one of its tasks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Scope {
    Global,
    Task(TaskSlug),
}

impl Scope {
    pub(crate) fn for_task(task: Option<&TaskSlug>) -> Self {
        match task {
            Some(slug) => Self::Task(slug.clone()),
            None => Self::Global,
        }
    }

    /// Scopes in evaluation order: global always comes first.
    pub(crate) fn chain(task: Option<&TaskSlug>) -> Vec<Scope> {
        let mut scopes = vec![Self::Global];
        if let Some(slug) = task {
            scopes.push(Self::Task(slug.clone()));
        }
        scopes
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Task(slug) => write!(f, "task:{}", slug),
        }
    }
}
