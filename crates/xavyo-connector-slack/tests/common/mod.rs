//! Common test utilities for xavyo-connector-slack integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xavyo_connector_slack::{
    DirectorySource, ErrorOutcome, LookupRequest, Method, OutcomeCategory, Page, PageRequest,
    SlackConfig, SlackError, SlackResult,
};

/// Installs a test subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

/// Test data factory for creating Slack users.
pub fn create_test_user(id: &str, team_id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "team_id": team_id,
        "name": name,
        "real_name": format!("Test User {}", name),
        "deleted": false,
        "is_admin": false,
        "is_owner": false,
        "is_primary_owner": false,
        "is_restricted": false,
        "is_ultra_restricted": false,
        "is_bot": false,
        "profile": {
            "email": format!("{}@example.com", name),
            "real_name": format!("Test User {}", name),
            "display_name": name
        }
    })
}

/// Test data factory for creating a user with one flag set.
pub fn create_flagged_user(id: &str, team_id: &str, flag: &str) -> Value {
    let mut user = create_test_user(id, team_id, id);
    user[flag] = json!(true);
    user
}

/// Test data factory for creating workspaces.
pub fn create_test_team(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "domain": name.to_lowercase().replace(' ', "-"),
        "enterprise_id": "E1"
    })
}

/// Test data factory for creating user groups.
pub fn create_test_usergroup(id: &str, team_id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "team_id": team_id,
        "name": name,
        "handle": name.to_lowercase(),
        "description": format!("Test group: {}", name),
        "date_delete": 0,
        "user_count": 0
    })
}

/// Test data factory for creating enterprise role assignments.
pub fn create_role_assignment(role_id: &str, user_id: &str) -> Value {
    json!({
        "role_id": role_id,
        "entity_id": "E1",
        "user_id": user_id,
        "date_create": 1_700_000_000
    })
}

/// Wraps items in a Slack list response.
pub fn create_list_response(key: &str, items: Vec<Value>, next_cursor: Option<&str>) -> Value {
    json!({
        "ok": true,
        key: items,
        "response_metadata": { "next_cursor": next_cursor.unwrap_or("") }
    })
}

/// Creates a Slack error envelope.
pub fn create_slack_error(error: &str) -> Value {
    json!({ "ok": false, "error": error })
}

/// Mock server wrapper with common setup helpers.
pub struct MockSlackServer {
    pub server: MockServer,
}

impl MockSlackServer {
    pub async fn start() -> Self {
        init_tracing();
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Standalone configuration pointing at the mock server.
    pub fn config(&self) -> SlackConfig {
        SlackConfig::builder()
            .base_url(format!("{}/api", self.uri()))
            .build()
            .expect("valid test config")
    }

    /// Enterprise configuration pointing at the mock server.
    pub fn enterprise_config(&self, enterprise_id: &str) -> SlackConfig {
        SlackConfig::builder()
            .base_url(format!("{}/api", self.uri()))
            .enterprise_id(enterprise_id)
            .build()
            .expect("valid test config")
    }

    /// Answers every call of `api_method` with `body`.
    pub async fn mock_method(&self, api_method: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/{api_method}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

type FixtureKey = (Method, String, String);

/// In-memory directory for orchestrator tests.
///
/// Pages are keyed by method, scope parameter (`usergroup`, else `team_id`,
/// else empty) and cursor. Every request is recorded.
#[derive(Default)]
pub struct FakeDirectory {
    pages: Mutex<HashMap<FixtureKey, Page<Value>>>,
    objects: Mutex<HashMap<Method, Value>>,
    failures: Mutex<HashMap<FixtureKey, VecDeque<OutcomeCategory>>>,
    requests: Mutex<Vec<FixtureKey>>,
}

fn scope_param(request: &PageRequest) -> String {
    request
        .params
        .get("usergroup")
        .or_else(|| request.params.get("team_id"))
        .unwrap_or_default()
        .to_string()
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    /// Registers one page.
    pub fn add_page(
        &self,
        api_method: Method,
        scope: &str,
        cursor: &str,
        items: Vec<Value>,
        next_cursor: Option<&str>,
    ) {
        self.pages.lock().unwrap().insert(
            (api_method, scope.to_string(), cursor.to_string()),
            Page {
                items,
                next_cursor: next_cursor.map(String::from),
                rate_limit: None,
            },
        );
    }

    /// Registers `items` split into pages of `page_size`, with cursors
    /// `""`, `"p2"`, `"p3"`, ...
    pub fn add_paged(&self, api_method: Method, scope: &str, items: Vec<Value>, page_size: usize) {
        let chunks: Vec<Vec<Value>> = items.chunks(page_size).map(<[Value]>::to_vec).collect();
        let count = chunks.len().max(1);
        let mut chunks = chunks.into_iter();
        for index in 0..count {
            let cursor = if index == 0 {
                String::new()
            } else {
                format!("p{}", index + 1)
            };
            let next = (index + 1 < count).then(|| format!("p{}", index + 2));
            self.add_page(
                api_method,
                scope,
                &cursor,
                chunks.next().unwrap_or_default(),
                next.as_deref(),
            );
        }
    }

    /// Registers the answer of a lookup method.
    pub fn add_object(&self, api_method: Method, value: Value) {
        self.objects.lock().unwrap().insert(api_method, value);
    }

    /// Makes the next fetch of one page fail with `category`.
    pub fn fail_next(&self, api_method: Method, scope: &str, cursor: &str, category: OutcomeCategory) {
        self.failures
            .lock()
            .unwrap()
            .entry((api_method, scope.to_string(), cursor.to_string()))
            .or_default()
            .push_back(category);
    }

    /// Every page request so far, in order.
    pub fn requests(&self) -> Vec<FixtureKey> {
        self.requests.lock().unwrap().clone()
    }

    /// Cursors requested for one method, in order.
    pub fn cursors(&self, api_method: Method) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|(m, _, _)| *m == api_method)
            .map(|(_, _, cursor)| cursor)
            .collect()
    }

    pub fn request_count(&self, api_method: Method) -> usize {
        self.cursors(api_method).len()
    }
}

#[async_trait]
impl DirectorySource for FakeDirectory {
    async fn fetch_page(&self, request: &PageRequest) -> SlackResult<Page<Value>> {
        let key = (request.method, scope_param(request), request.cursor.clone());
        self.requests.lock().unwrap().push(key.clone());

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(category) = failure {
            return Err(SlackError::api(
                ErrorOutcome::new(category),
                format!("injected {category} failure"),
            ));
        }

        self.pages.lock().unwrap().get(&key).cloned().ok_or_else(|| {
            SlackError::api(
                ErrorOutcome::new(OutcomeCategory::NotFound),
                format!("no fixture for {key:?}"),
            )
        })
    }

    async fn fetch_one(&self, request: &LookupRequest) -> SlackResult<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&request.method)
            .cloned()
            .ok_or_else(|| {
                SlackError::api(
                    ErrorOutcome::new(OutcomeCategory::NotFound),
                    format!("no fixture for {}", request.method),
                )
            })
    }
}
