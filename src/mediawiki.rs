//! Blocking MediaWiki Action API client backing [`WikiSite`].

use serde::Deserialize;
use std::time::Duration;

use crate::config::WikiConfig;
use crate::wiki::{WikiError, WikiSite};

const USER_AGENT: &str = concat!("jogobot/", env!("CARGO_PKG_VERSION"), " (status gate)");

#[derive(Debug, Deserialize)]
struct ApiResponse<Q> {
    error: Option<ApiErrorWire>,
    query: Option<Q>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorWire {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<PageWire>,
}

#[derive(Debug, Deserialize)]
struct PageWire {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    revisions: Vec<RevisionWire>,
}

#[derive(Debug, Deserialize)]
struct RevisionWire {
    slots: SlotsWire,
}

#[derive(Debug, Deserialize)]
struct SlotsWire {
    main: SlotWire,
}

#[derive(Debug, Deserialize)]
struct SlotWire {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    #[serde(default)]
    users: Vec<UserWire>,
}

#[derive(Debug, Deserialize)]
struct UserWire {
    name: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    blockid: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct MediaWikiSite {
    agent: ureq::Agent,
    api_url: String,
    username: String,
}

impl MediaWikiSite {
    pub(crate) fn new(config: &WikiConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            api_url: config.api_url.clone(),
            username: config.username.clone(),
        }
    }

    fn query(&self, params: &[(&str, &str)]) -> Result<String, WikiError> {
        let mut request = self.agent.get(&self.api_url);
        for &(key, value) in &BASE_PARAMS {
            request = request.query(key, value);
        }
        for &(key, value) in params {
            request = request.query(key, value);
        }
        let response = request
            .call()
            .map_err(|err| WikiError::Transport(err.to_string()))?;
        response
            .into_string()
            .map_err(|err| WikiError::Transport(err.to_string()))
    }
}

const BASE_PARAMS: [(&str, &str); 3] = [
    ("action", "query"),
    ("format", "json"),
    ("formatversion", "2"),
];

/// Latest revision of `title`, main slot only.
fn page_text_params(title: &str) -> [(&'static str, &str); 4] {
    [
        ("prop", "revisions"),
        ("rvprop", "content"),
        ("rvslots", "main"),
        ("titles", title),
    ]
}

fn user_block_params(username: &str) -> [(&'static str, &str); 3] {
    [
        ("list", "users"),
        ("ususers", username),
        ("usprop", "blockinfo"),
    ]
}

impl WikiSite for MediaWikiSite {
    fn page_text(&self, title: &str) -> Result<Option<String>, WikiError> {
        let body = self.query(&page_text_params(title))?;
        parse_page_text(&body)
    }

    fn is_user_blocked(&self) -> Result<bool, WikiError> {
        let body = self.query(&user_block_params(&self.username))?;
        parse_user_blocked(&body)
    }
}

fn decode<Q: for<'de> Deserialize<'de>>(body: &str) -> Result<Q, WikiError> {
    let response: ApiResponse<Q> =
        serde_json::from_str(body).map_err(|err| WikiError::Malformed(err.to_string()))?;
    if let Some(error) = response.error {
        return Err(WikiError::Api {
            code: error.code,
            info: error.info,
        });
    }
    response
        .query
        .ok_or_else(|| WikiError::Malformed("response has no query object".to_string()))
}

fn parse_page_text(body: &str) -> Result<Option<String>, WikiError> {
    let query: PagesQuery = decode(body)?;
    let Some(page) = query.pages.into_iter().next() else {
        return Err(WikiError::Malformed("response lists no pages".to_string()));
    };
    if page.invalid {
        return Err(WikiError::Malformed("status page title is invalid".to_string()));
    }
    if page.missing {
        return Ok(None);
    }
    page.revisions
        .into_iter()
        .next()
        .map(|revision| Some(revision.slots.main.content))
        .ok_or_else(|| WikiError::Malformed("page has no revision content".to_string()))
}

fn parse_user_blocked(body: &str) -> Result<bool, WikiError> {
    let query: UsersQuery = decode(body)?;
    let Some(user) = query.users.into_iter().next() else {
        return Err(WikiError::Malformed("response lists no users".to_string()));
    };
    if user.missing || user.invalid {
        return Err(WikiError::UnknownUser(user.name));
    }
    Ok(user.blockid.is_some())
}
