use std::path::PathBuf;

use crate::logger::{Level, Logger};
use crate::notify::{Delivery, Mail, Notify, Recipients};
use crate::scope::{Scope, TaskSlug};
use crate::store::{DisableStore, StoreError};
use crate::wiki::{StatusPageError, WikiError, WikiSite, WikiStatusSource};

/// Proof that the status check passed. Only [`StatusChecker::check`] hands one out.
#[must_use = "a task may only run while holding a permit"]
#[derive(Debug)]
pub(crate) struct Permit {
    task: Option<TaskSlug>,
}

impl Permit {
    pub(crate) fn task(&self) -> Option<&TaskSlug> {
        self.task.as_ref()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CheckError {
    #[error("bot account {account:?} is blocked on the wiki")]
    Blocked { account: String },
    #[error("{scope} is disabled by file {}", .marker.display())]
    DisabledByFile { scope: Scope, marker: PathBuf },
    #[error("{scope} is disabled on wiki{}", by_file_suffix(.also_by_file))]
    DisabledOnWiki { scope: Scope, also_by_file: bool },
    #[error("status page {title:?} for {scope} does not exist; cannot determine status")]
    MissingStatusPage { scope: Scope, title: String },
    #[error(transparent)]
    Wiki(#[from] WikiError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

fn by_file_suffix(also_by_file: &bool) -> &'static str {
    if *also_by_file {
        ", and also by file"
    } else {
        ""
    }
}

impl CheckError {
    /// Deliberate denials, as opposed to failures to determine the status.
    pub(crate) fn is_disablement(&self) -> bool {
        matches!(
            self,
            Self::Blocked { .. } | Self::DisabledByFile { .. } | Self::DisabledOnWiki { .. }
        )
    }
}

impl From<StatusPageError> for CheckError {
    fn from(err: StatusPageError) -> Self {
        match err {
            StatusPageError::Missing { scope, title } => Self::MissingStatusPage { scope, title },
            StatusPageError::Wiki(err) => Self::Wiki(err),
        }
    }
}

/// Combined file/wiki state of one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopeStatus {
    Active,
    DisabledByFileOnly,
    DisabledOnWikiOnly,
    DisabledBoth,
}

impl ScopeStatus {
    pub(crate) fn from_flags(by_file: bool, on_wiki: bool) -> Self {
        match (by_file, on_wiki) {
            (false, false) => Self::Active,
            (true, false) => Self::DisabledByFileOnly,
            (false, true) => Self::DisabledOnWikiOnly,
            (true, true) => Self::DisabledBoth,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::DisabledByFileOnly => "disabled by file",
            Self::DisabledOnWikiOnly => "disabled on wiki",
            Self::DisabledBoth => "disabled on wiki and by file",
        }
    }
}

/// Read-only view of the block state and the per-scope flags. Never escalates.
pub(crate) struct StatusView<S> {
    wiki: WikiStatusSource<S>,
    store: DisableStore,
}

impl<S: WikiSite> StatusView<S> {
    pub(crate) fn new(wiki: WikiStatusSource<S>, store: DisableStore) -> Self {
        Self { wiki, store }
    }

    pub(crate) fn inspect(&self, scope: &Scope) -> Result<ScopeStatus, CheckError> {
        let by_file = self.store.is_disabled_by_file(scope);
        let on_wiki = self.wiki.is_disabled_on_wiki(scope)?;
        Ok(ScopeStatus::from_flags(by_file, on_wiki))
    }

    pub(crate) fn is_blocked(&self) -> Result<bool, CheckError> {
        Ok(self.wiki.is_blocked()?)
    }
}

/// Decides whether the bot, or one of its tasks, may run.
///
/// Order of evaluation: account block (write runs only), then the global scope,
/// then the task scope. The first negative result is escalated and returned.
pub(crate) struct StatusChecker<'a, S, N> {
    account: String,
    view: StatusView<S>,
    notifier: N,
    recipients: Recipients,
    logger: &'a Logger,
}

impl<'a, S: WikiSite, N: Notify> StatusChecker<'a, S, N> {
    pub(crate) fn new(
        account: &str,
        wiki: WikiStatusSource<S>,
        store: DisableStore,
        notifier: N,
        recipients: Recipients,
        logger: &'a Logger,
    ) -> Self {
        Self {
            account: account.to_string(),
            view: StatusView::new(wiki, store),
            notifier,
            recipients,
            logger,
        }
    }

    pub(crate) fn check(&self, task: Option<&TaskSlug>, write: bool) -> Result<Permit, CheckError> {
        self.logger.log_transition(&format!(
            "check start scope={} write={}",
            Scope::for_task(task),
            write
        ));
        if write {
            self.check_blocked()?;
        }
        for scope in Scope::chain(task) {
            self.check_scope(&scope)?;
        }
        self.logger
            .log_transition(&format!("check passed scope={}", Scope::for_task(task)));
        Ok(Permit {
            task: task.cloned(),
        })
    }

    fn check_blocked(&self) -> Result<(), CheckError> {
        if !self.view.is_blocked()? {
            return Ok(());
        }
        let err = CheckError::Blocked {
            account: self.account.clone(),
        };
        self.logger.output(Level::Critical, &err.to_string());
        self.notify(
            &format!("[{}] account blocked", self.account),
            &format!(
                "The wiki account {} is blocked. No task will run until the block is lifted.",
                self.account
            ),
        );
        Err(err)
    }

    fn check_scope(&self, scope: &Scope) -> Result<(), CheckError> {
        let status = self.view.inspect(scope)?;
        self.logger.log_transition(&format!(
            "scope_state scope={} state={}",
            scope,
            status.as_str()
        ));

        match status {
            ScopeStatus::Active => Ok(()),
            ScopeStatus::DisabledBoth => {
                let err = CheckError::DisabledOnWiki {
                    scope: scope.clone(),
                    also_by_file: true,
                };
                self.logger.output(Level::Error, &err.to_string());
                Err(err)
            }
            ScopeStatus::DisabledByFileOnly => {
                let err = CheckError::DisabledByFile {
                    scope: scope.clone(),
                    marker: self.view.store.marker_path(scope),
                };
                self.logger.output(Level::Error, &err.to_string());
                Err(err)
            }
            ScopeStatus::DisabledOnWikiOnly => {
                let err = CheckError::DisabledOnWiki {
                    scope: scope.clone(),
                    also_by_file: false,
                };
                self.logger.output(Level::Error, &err.to_string());
                let marker = self.view.store.marker_path(scope);
                self.notify(
                    &format!("[{}] {} disabled on wiki", self.account, scope),
                    &format!(
                        "The status page {:?} does not contain \"true\", so {} has been disabled.\n\
The marker {} is created to keep it disabled; remove it after re-enabling the page.",
                        self.view.wiki.status_page_title(scope),
                        scope,
                        marker.display()
                    ),
                );
                // Later runs stop at the marker instead of notifying again.
                self.view.store.create_disable_file(scope)?;
                self.logger
                    .log_transition(&format!("marker_created path={}", marker.display()));
                Err(err)
            }
        }
    }

    /// Alerts the operators. Delivery problems are logged, never fatal.
    fn notify(&self, subject: &str, body: &str) {
        let mail = Mail::new(subject, body, &self.recipients);
        match self.notifier.send(&mail) {
            Ok(Delivery::Sent) => self
                .logger
                .log_transition(&format!("notified subject={}", subject)),
            Ok(Delivery::FallbackLogged { reason }) => self.logger.log_transition(&format!(
                "notified_fallback subject={} reason={}",
                subject, reason
            )),
            Err(err) => self
                .logger
                .output(Level::Error, &format!("notification failed: {}", err)),
        }
    }
}
