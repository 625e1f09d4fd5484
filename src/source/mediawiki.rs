//! MediaWiki action-API implementation of [`EventSource`].
//!
//! Talks to two endpoints: the home wiki (membership lists, checkuser log,
//! suppression log) and the meta wiki (global rights log, ombuds list).
//! Login uses a bot password: fetch a login token, then POST
//! `action=login`. The session cookie lives in the reqwest cookie store.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use dialoguer::{Input, Password, theme::ColorfulTheme};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::{ActionEvent, Role, RoleChangeEvent, RoleChangeKind};

use super::{ActionQuery, Continuation, EventSource, Page, SourceError};

/// Default home-wiki API endpoint.
pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
/// Default meta-wiki API endpoint (rights log, global groups).
pub const DEFAULT_META_API_URL: &str = "https://meta.wikimedia.org/w/api.php";
/// Wiki tag appended to usernames in the global rights log.
const DEFAULT_HOME_WIKI: &str = "enwiki";
/// Wikitext page listing arbitration-committee members.
const ARBCOM_PAGE: &str = "Wikipedia:Arbitration Committee/Members";

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Bot-password credentials for the home wiki.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Fill in whichever fields the flags and environment did not supply,
    /// prompting interactively for the rest. Each field falls back on its
    /// own: a supplied username is kept even when the password still has to
    /// be asked for.
    ///
    /// A primary account password will not work; bot passwords are created
    /// at Special:BotPasswords.
    pub fn resolve(
        username: Option<String>,
        password: Option<String>,
    ) -> anyhow::Result<Self> {
        if username.is_none() || password.is_none() {
            println!(
                "Please log in with a bot password \
                 (https://en.wikipedia.org/wiki/Special:BotPasswords).\n\
                 Your primary account name and password will not work."
            );
        }
        let theme = ColorfulTheme::default();
        Self::resolve_with(
            username,
            password,
            || {
                Input::with_theme(&theme)
                    .with_prompt("Username")
                    .interact_text()
                    .context("reading username")
            },
            || {
                Password::with_theme(&theme)
                    .with_prompt("Password")
                    .interact()
                    .context("reading password")
            },
        )
    }

    fn resolve_with<FU, FP>(
        username: Option<String>,
        password: Option<String>,
        prompt_username: FU,
        prompt_password: FP,
    ) -> anyhow::Result<Self>
    where
        FU: FnOnce() -> anyhow::Result<String>,
        FP: FnOnce() -> anyhow::Result<String>,
    {
        let username = match username {
            Some(username) => username,
            None => prompt_username()?,
        };
        let password = match password {
            Some(password) => password,
            None => prompt_password()?,
        };
        Ok(Self { username, password })
    }
}

// --- wire types -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    info: String,
}

/// Envelope common to every action-API response: an optional error, an
/// optional continuation block, and the query payload.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "Q: serde::Deserialize<'de>"))]
struct Envelope<Q> {
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(rename = "continue", default)]
    continuation: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    query: Option<Q>,
}

impl<Q> Envelope<Q> {
    /// Unwrap the query payload, surfacing the API error envelope if
    /// present.
    fn into_query(self) -> Result<(Q, Option<serde_json::Map<String, serde_json::Value>>), SourceError> {
        if let Some(err) = self.error {
            return Err(SourceError::Api {
                code: err.code,
                info: err.info,
            });
        }
        let query = self
            .query
            .ok_or_else(|| SourceError::Malformed("response has no query payload".into()))?;
        Ok((query, self.continuation))
    }
}

/// Extract a named continuation token (`lecontinue`, `culcontinue`) from a
/// continue block. Numeric tokens are stringified.
fn continuation_token(
    block: Option<&serde_json::Map<String, serde_json::Value>>,
    key: &str,
) -> Option<Continuation> {
    let value = block?.get(key)?;
    match value {
        serde_json::Value::String(s) => Some(Continuation(s.clone())),
        other => Some(Continuation(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AllUsersQuery {
    #[serde(default)]
    allusers: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct GlobalAllUsersQuery {
    #[serde(default)]
    globalallusers: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct TokensQuery {
    tokens: LoginTokens,
}

#[derive(Debug, Deserialize)]
struct LoginTokens {
    logintoken: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login: LoginResult,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    result: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RightsParams {
    #[serde(default)]
    oldgroups: Vec<String>,
    #[serde(default)]
    newgroups: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RightsLogEntry {
    /// Absent on suppressed entries.
    #[serde(default)]
    title: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    params: Option<RightsParams>,
}

#[derive(Debug, Deserialize)]
struct LogEventsQuery<E> {
    #[serde(default = "Vec::new")]
    logevents: Vec<E>,
}

#[derive(Debug, Deserialize)]
struct TimestampedEntry {
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CheckUserLogQuery {
    checkuserlog: CheckUserLogEntries,
}

#[derive(Debug, Deserialize)]
struct CheckUserLogEntries {
    #[serde(default)]
    entries: Vec<TimestampedEntry>,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: ParseBody,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    wikitext: String,
}

// --- client ---------------------------------------------------------------

/// Read-only MediaWiki API session.
pub struct MediaWikiClient {
    http: reqwest::blocking::Client,
    api_url: String,
    meta_api_url: String,
    home_wiki: String,
}

impl MediaWikiClient {
    pub fn new(
        operator: &str,
        api_url: impl Into<String>,
        meta_api_url: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let user_agent = format!(
            "AuditCUOS/{}, run by {}, https://github.com/molly/audit-cuos",
            env!("CARGO_PKG_VERSION"),
            operator
        );
        let http = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            meta_api_url: meta_api_url.into(),
            home_wiki: DEFAULT_HOME_WIKI.to_string(),
        })
    }

    fn get<Q: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Q, SourceError> {
        let response = self.http.get(url).query(params).send()?.error_for_status()?;
        Ok(response.json()?)
    }

    /// Log in with a bot password: token fetch, then the login POST.
    pub fn login(&self, credentials: &Credentials) -> Result<(), SourceError> {
        let token_envelope: Envelope<TokensQuery> = self.get(
            &self.api_url,
            &[
                ("action", "query"),
                ("meta", "tokens"),
                ("type", "login"),
                ("format", "json"),
            ],
        )?;
        let (tokens, _) = token_envelope.into_query()?;

        let response: LoginResponse = self
            .http
            .post(&self.api_url)
            .form(&[
                ("action", "login"),
                ("lgname", credentials.username.as_str()),
                ("lgpassword", credentials.password.as_str()),
                ("lgtoken", tokens.tokens.logintoken.as_str()),
                ("format", "json"),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        if response.login.result != "Success" {
            return Err(SourceError::Login {
                result: response.login.result,
                reason: response.login.reason.unwrap_or_default(),
            });
        }
        debug!(user = %credentials.username, "logged in");
        Ok(())
    }

    /// Arbitration-committee members, scraped from the member-list page's
    /// `{{user|...}}` templates. Used only to highlight report rows.
    pub fn arbitrators(&self) -> Result<Vec<String>, SourceError> {
        let response: ParseResponse = self.get(
            &self.api_url,
            &[
                ("action", "parse"),
                ("format", "json"),
                ("page", ARBCOM_PAGE),
                ("prop", "wikitext"),
                ("formatversion", "2"),
            ],
        )?;
        let re = Regex::new(r"\{\{user\|(.*?)\}\}")
            .map_err(|e| SourceError::Malformed(format!("user template pattern: {e}")))?;
        Ok(re
            .captures_iter(&response.parse.wikitext)
            .map(|c| c[1].to_string())
            .collect())
    }

    /// Ombuds-commission members from the meta wiki's global group.
    pub fn ombuds(&self) -> Result<Vec<String>, SourceError> {
        let envelope: Envelope<GlobalAllUsersQuery> = self.get(
            &self.meta_api_url,
            &[
                ("action", "query"),
                ("format", "json"),
                ("list", "globalallusers"),
                ("agugroup", "ombuds"),
            ],
        )?;
        let (query, _) = envelope.into_query()?;
        Ok(query.globalallusers.into_iter().map(|u| u.name).collect())
    }

    /// Translate one rights-log entry into zero or more per-role events by
    /// diffing the old and new group lists. Suppressed entries (no title)
    /// and titles for other wikis are skipped.
    fn translate_rights_entry(&self, entry: RightsLogEntry) -> Vec<RoleChangeEvent> {
        let suffix = format!("@{}", self.home_wiki);
        let Some(title) = entry.title else {
            return Vec::new();
        };
        let Some(subject) = title
            .strip_prefix("User:")
            .and_then(|t| t.strip_suffix(&suffix))
        else {
            return Vec::new();
        };
        let Some(params) = entry.params else {
            warn!(%title, "rights-log entry without group params");
            return Vec::new();
        };

        let mut events = Vec::new();
        for role in Role::ALL {
            let group = role.group_name();
            let had = params.oldgroups.iter().any(|g| g == group);
            let has = params.newgroups.iter().any(|g| g == group);
            let kind = match (had, has) {
                (false, true) => RoleChangeKind::Add,
                (true, false) => RoleChangeKind::Remove,
                _ => continue,
            };
            events.push(RoleChangeEvent {
                subject: subject.to_string(),
                role,
                timestamp: entry.timestamp,
                kind,
            });
        }
        events
    }
}

fn iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl EventSource for MediaWikiClient {
    fn current_holders(&self, role: Role) -> Result<Vec<String>, SourceError> {
        let envelope: Envelope<AllUsersQuery> = self.get(
            &self.api_url,
            &[
                ("action", "query"),
                ("list", "allusers"),
                ("format", "json"),
                ("augroup", role.group_name()),
                ("aulimit", "500"),
            ],
        )?;
        let (query, _) = envelope.into_query()?;
        Ok(query.allusers.into_iter().map(|u| u.name).collect())
    }

    fn role_change_page(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        continuation: Option<&Continuation>,
    ) -> Result<Page<RoleChangeEvent>, SourceError> {
        // lestart is the newer bound: the API walks the log newest-first.
        let start = iso(to);
        let end = iso(from);
        let mut params = vec![
            ("action", "query"),
            ("list", "logevents"),
            ("leprop", "title|timestamp|details"),
            ("letype", "rights"),
            ("lelimit", "max"),
            ("lestart", start.as_str()),
            ("leend", end.as_str()),
            ("format", "json"),
        ];
        if let Some(Continuation(token)) = continuation {
            params.push(("lecontinue", token.as_str()));
        }
        // The global rights log lives on the meta wiki.
        let envelope: Envelope<LogEventsQuery<RightsLogEntry>> =
            self.get(&self.meta_api_url, &params)?;
        let (query, cont) = envelope.into_query()?;
        let items = query
            .logevents
            .into_iter()
            .flat_map(|entry| self.translate_rights_entry(entry))
            .collect();
        Ok(Page {
            items,
            continuation: continuation_token(cont.as_ref(), "lecontinue"),
        })
    }

    fn action_page(
        &self,
        query: &ActionQuery,
        continuation: Option<&Continuation>,
    ) -> Result<Page<ActionEvent>, SourceError> {
        let newer = iso(query.to);
        let older = iso(query.from);
        let limit = query.limit.to_string();
        match query.role {
            Role::CheckUser => {
                let mut params = vec![
                    ("action", "query"),
                    ("list", "checkuserlog"),
                    ("culuser", query.subject.as_str()),
                    ("cullimit", limit.as_str()),
                    ("culfrom", newer.as_str()),
                    ("culto", older.as_str()),
                    ("format", "json"),
                ];
                if let Some(Continuation(token)) = continuation {
                    params.push(("culcontinue", token.as_str()));
                }
                let envelope: Envelope<CheckUserLogQuery> = self.get(&self.api_url, &params)?;
                let (payload, cont) = envelope.into_query()?;
                let items = payload
                    .checkuserlog
                    .entries
                    .into_iter()
                    .map(|e| ActionEvent {
                        timestamp: e.timestamp,
                    })
                    .collect();
                Ok(Page {
                    items,
                    continuation: continuation_token(cont.as_ref(), "culcontinue"),
                })
            }
            Role::Oversight => {
                let mut params = vec![
                    ("action", "query"),
                    ("list", "logevents"),
                    ("leprop", "timestamp"),
                    ("letype", "suppress"),
                    ("leuser", query.subject.as_str()),
                    ("lelimit", limit.as_str()),
                    ("lestart", newer.as_str()),
                    ("leend", older.as_str()),
                    ("format", "json"),
                ];
                if let Some(Continuation(token)) = continuation {
                    params.push(("lecontinue", token.as_str()));
                }
                let envelope: Envelope<LogEventsQuery<TimestampedEntry>> =
                    self.get(&self.api_url, &params)?;
                let (payload, cont) = envelope.into_query()?;
                let items = payload
                    .logevents
                    .into_iter()
                    .map(|e| ActionEvent {
                        timestamp: e.timestamp,
                    })
                    .collect();
                Ok(Page {
                    items,
                    continuation: continuation_token(cont.as_ref(), "lecontinue"),
                })
            }
        }
    }
}
