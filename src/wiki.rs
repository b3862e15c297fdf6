use crate::config::{WikiConfig, TASK_PLACEHOLDER};
use crate::scope::Scope;

#[derive(Debug, thiserror::Error)]
pub(crate) enum WikiError {
    #[error("wiki request failed: {0}")]
    Transport(String),
    #[error("wiki api error {code}: {info}")]
    Api { code: String, info: String },
    #[error("unexpected wiki response: {0}")]
    Malformed(String),
    #[error("wiki user {0:?} does not exist")]
    UnknownUser(String),
}

/// Narrow read interface onto the wiki.
pub(crate) trait WikiSite {
    /// Source text of `title`, or `None` when the page does not exist.
    fn page_text(&self, title: &str) -> Result<Option<String>, WikiError>;

    /// Whether the bot account is currently blocked on the wiki.
    fn is_user_blocked(&self) -> Result<bool, WikiError>;
}

impl<T: WikiSite + ?Sized> WikiSite for &T {
    fn page_text(&self, title: &str) -> Result<Option<String>, WikiError> {
        (**self).page_text(title)
    }

    fn is_user_blocked(&self) -> Result<bool, WikiError> {
        (**self).is_user_blocked()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StatusPageError {
    #[error("status page {title:?} for {scope} does not exist")]
    Missing { scope: Scope, title: String },
    #[error(transparent)]
    Wiki(#[from] WikiError),
}

/// Remote on/off switches: one status page per scope, enabled iff its text
/// contains `true` (any case).
#[derive(Debug)]
pub(crate) struct WikiStatusSource<S> {
    site: S,
    global_page: String,
    task_page: String,
}

impl<S: WikiSite> WikiStatusSource<S> {
    pub(crate) fn new(site: S, config: &WikiConfig) -> Self {
        Self {
            site,
            global_page: config.global_status_page.clone(),
            task_page: config.task_status_page.clone(),
        }
    }

    pub(crate) fn status_page_title(&self, scope: &Scope) -> String {
        match scope {
            Scope::Global => self.global_page.clone(),
            Scope::Task(slug) => self.task_page.replace(TASK_PLACEHOLDER, slug.as_str()),
        }
    }

    pub(crate) fn is_blocked(&self) -> Result<bool, WikiError> {
        self.site.is_user_blocked()
    }

    pub(crate) fn is_disabled_on_wiki(&self, scope: &Scope) -> Result<bool, StatusPageError> {
        let title = self.status_page_title(scope);
        let Some(text) = self.site.page_text(&title)? else {
            return Err(StatusPageError::Missing {
                scope: scope.clone(),
                title,
            });
        };
        Ok(!page_enables(&text))
    }
}

pub(crate) fn page_enables(text: &str) -> bool {
    text.to_lowercase().contains("true")
}
