use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use codesync_store::{TokenHandle, UserTable};
use serde_json::json;
use tokio::sync::Mutex;

use crate::{Connector, Credentials, Error, LogEvent, LogSink};

#[derive(Debug, Clone)]
pub struct Settings {
    pub log_group: String,
    /// Tag sent along with every message.
    pub source: String,
}

/// Ships messages to the remote log stream of the acting identity.
///
/// One sink is built per identity on first use and reused afterwards, until
/// that identity's credentials change.
pub struct Shipper<C: Connector> {
    connector: C,
    users_file: PathBuf,
    tokens: TokenHandle,
    settings: Settings,
    sinks: Mutex<HashMap<String, (Credentials, Arc<C::Sink>)>>,
}

impl<C: Connector> Shipper<C> {
    pub fn new<P>(connector: C, users_file: P, tokens: TokenHandle, settings: Settings) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            connector,
            users_file: users_file.as_ref().to_path_buf(),
            tokens,
            settings,
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Ships `message` as the user named by `hint`, or as the first known
    /// user if there's no such user.
    ///
    /// Nothing is returned to the caller: failures are logged locally, and a
    /// message with no identity to ship it as is dropped.
    pub async fn put_log_event(&self, message: &str, hint: Option<&str>) {
        log::warn!("{}", message);

        let users = match UserTable::load(&self.users_file) {
            Ok(users) => users,
            Err(e) => {
                log::error!("cannot load users to ship log event: {}", e);
                return;
            }
        };
        let (email, credentials) = match users.resolve(hint) {
            Some((email, user)) if user.has_credentials() => (
                email.to_string(),
                Credentials {
                    access_key: user.access_key.clone(),
                    secret_key: user.secret_key.clone(),
                },
            ),
            _ => {
                log::debug!("no user with credentials; dropping log event");
                return;
            }
        };

        if let Err(e) = self.ship(&email, &credentials, message).await {
            log::error!("cannot ship log event as {}: {}", email, e);
        }
    }

    async fn ship(&self, email: &str, credentials: &Credentials, message: &str) -> Result<(), Error> {
        let sink = self.sink(email, credentials).await?;
        let events = [LogEvent {
            timestamp: Utc::now().timestamp_millis(),
            message: json!({
                "msg": message,
                "source": self.settings.source,
            })
            .to_string(),
        }];

        let mut token = self.tokens.load().await?.get(email).map(String::from);
        let mut retried = false;
        loop {
            match sink
                .put_log_events(&self.settings.log_group, email, &events, token.as_deref())
                .await
            {
                Ok(next) => {
                    self.store_token(email, next).await?;
                    return Ok(());
                }
                Err(e) if e.is_token_mismatch() && !retried => {
                    token = e.expected_sequence_token();
                    log::debug!("{}; retrying with token {:?}", e, token);
                    self.store_token(email, token.clone()).await?;
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn sink(&self, email: &str, credentials: &Credentials) -> Result<Arc<C::Sink>, Error> {
        let mut sinks = self.sinks.lock().await;
        match sinks.get(email) {
            Some((cached, sink)) if cached == credentials => return Ok(sink.clone()),
            Some(_) => log::debug!("credentials of {} changed; reconnecting", email),
            None => {}
        }

        let sink = Arc::new(self.connector.connect(credentials)?);
        sinks.insert(email.to_string(), (credentials.clone(), sink.clone()));
        Ok(sink)
    }

    async fn store_token(&self, email: &str, token: Option<String>) -> Result<(), Error> {
        self.tokens
            .update(|tokens| tokens.set(email, token))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex as StdMutex,
        },
    };

    use async_trait::async_trait;
    use codesync_store::{record, SequenceTokenTable, User};
    use tempfile::TempDir;

    use super::*;
    use crate::PutError;

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        key: String,
        stream: String,
        message: String,
        token: Option<String>,
    }

    #[derive(Default)]
    struct Script {
        calls: Vec<Call>,
        responses: VecDeque<Result<Option<String>, PutError>>,
    }

    struct FakeSink {
        key: String,
        script: Arc<StdMutex<Script>>,
    }

    #[async_trait]
    impl LogSink for FakeSink {
        async fn put_log_events(
            &self,
            group: &str,
            stream: &str,
            events: &[LogEvent],
            sequence_token: Option<&str>,
        ) -> Result<Option<String>, PutError> {
            assert_eq!(group, "client");
            let mut script = self.script.lock().unwrap();
            script.calls.push(Call {
                key: self.key.clone(),
                stream: stream.to_string(),
                message: events[0].message.clone(),
                token: sequence_token.map(String::from),
            });
            script.responses.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        connects: AtomicUsize,
        script: Arc<StdMutex<Script>>,
    }

    impl Connector for FakeConnector {
        type Sink = FakeSink;

        fn connect(&self, credentials: &Credentials) -> Result<FakeSink, Error> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSink {
                key: credentials.access_key.clone(),
                script: self.script.clone(),
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        tokens: TokenHandle,
        shipper: Shipper<FakeConnector>,
    }

    impl Fixture {
        fn new(users: &[(&str, &str)]) -> anyhow::Result<Self> {
            let dir = TempDir::new()?;
            let users_file = dir.path().join("user.yml");

            let mut table = UserTable::default();
            for (email, key) in users.iter() {
                table.insert(
                    email,
                    User {
                        access_key: key.to_string(),
                        secret_key: "secret".into(),
                        ..User::default()
                    },
                );
            }
            record::write(&users_file, &table)?;

            let tokens = TokenHandle::new(dir.path().join("sequence_token.yml"));
            let shipper = Shipper::new(
                FakeConnector::default(),
                &users_file,
                tokens.clone(),
                Settings {
                    log_group: "client".into(),
                    source: "cli".into(),
                },
            );

            Ok(Self {
                _dir: dir,
                tokens,
                shipper,
            })
        }

        fn respond(&self, response: Result<Option<String>, PutError>) {
            self.shipper
                .connector
                .script
                .lock()
                .unwrap()
                .responses
                .push_back(response);
        }

        fn calls(&self) -> Vec<Call> {
            self.shipper.connector.script.lock().unwrap().calls.clone()
        }

        async fn token(&self, email: &str) -> anyhow::Result<Option<String>> {
            let table: SequenceTokenTable = self.tokens.load().await?;
            Ok(table.get(email).map(String::from))
        }
    }

    #[tokio::test]
    async fn test_ship_and_store_token() -> anyhow::Result<()> {
        let fixture = Fixture::new(&[("me@example.com", "mine")])?;
        fixture.respond(Ok(Some("100".into())));
        fixture.respond(Ok(Some("101".into())));

        fixture.shipper.put_log_event("first", None).await;
        assert_eq!(fixture.token("me@example.com").await?.as_deref(), Some("100"));

        fixture.shipper.put_log_event("second", None).await;
        assert_eq!(fixture.token("me@example.com").await?.as_deref(), Some("101"));

        let calls = fixture.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].stream, "me@example.com");
        assert_eq!(calls[0].token, None);
        assert_eq!(calls[1].token.as_deref(), Some("100"));

        let payload: serde_json::Value = serde_json::from_str(&calls[0].message)?;
        assert_eq!(payload, json!({"msg": "first", "source": "cli"}));

        // Both events went through the same sink.
        assert_eq!(fixture.shipper.connector.connects.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_token_recovery() -> anyhow::Result<()> {
        let fixture = Fixture::new(&[("me@example.com", "mine")])?;
        fixture
            .tokens
            .update(|tokens| tokens.set("me@example.com", Some("1".into())))
            .await?;

        fixture.respond(Err(PutError::InvalidSequenceToken {
            expected_sequence_token: Some("42".into()),
            message: "The given sequenceToken is invalid".into(),
        }));
        fixture.respond(Ok(Some("43".into())));
        fixture.respond(Ok(Some("44".into())));

        fixture.shipper.put_log_event("hello", None).await;
        let calls = fixture.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].token.as_deref(), Some("1"));
        assert_eq!(calls[1].token.as_deref(), Some("42"));
        assert_eq!(calls[0].message, calls[1].message);
        assert_eq!(fixture.token("me@example.com").await?.as_deref(), Some("43"));

        fixture.shipper.put_log_event("again", None).await;
        assert_eq!(fixture.calls()[2].token.as_deref(), Some("43"));

        Ok(())
    }

    #[tokio::test]
    async fn test_retries_only_once() -> anyhow::Result<()> {
        let fixture = Fixture::new(&[("me@example.com", "mine")])?;
        for token in ["7", "8"].iter() {
            fixture.respond(Err(PutError::DataAlreadyAccepted {
                expected_sequence_token: None,
                message: format!("The next batch can be sent with sequenceToken: {}", token),
            }));
        }

        fixture.shipper.put_log_event("hello", None).await;
        assert_eq!(fixture.calls().len(), 2);
        // The token learnt from the first failure is kept.
        assert_eq!(fixture.token("me@example.com").await?.as_deref(), Some("7"));

        Ok(())
    }

    #[tokio::test]
    async fn test_other_errors_are_dropped() -> anyhow::Result<()> {
        let fixture = Fixture::new(&[("me@example.com", "mine")])?;
        fixture
            .tokens
            .update(|tokens| tokens.set("me@example.com", Some("5".into())))
            .await?;
        fixture.respond(Err(PutError::Rejected {
            status: 500,
            message: "boom".into(),
        }));

        fixture.shipper.put_log_event("hello", None).await;
        assert_eq!(fixture.calls().len(), 1);
        assert_eq!(fixture.token("me@example.com").await?.as_deref(), Some("5"));

        Ok(())
    }

    #[tokio::test]
    async fn test_identity_resolution() -> anyhow::Result<()> {
        let fixture = Fixture::new(&[("zed@example.com", "zed"), ("amy@example.com", "amy")])?;

        fixture.shipper.put_log_event("hinted", Some("zed@example.com")).await;
        fixture.shipper.put_log_event("unknown", Some("who@example.com")).await;
        fixture.shipper.put_log_event("none", None).await;

        let calls = fixture.calls();
        assert_eq!(
            calls
                .iter()
                .map(|call| (call.key.as_str(), call.stream.as_str()))
                .collect::<Vec<_>>(),
            vec![
                ("zed", "zed@example.com"),
                ("amy", "amy@example.com"),
                ("amy", "amy@example.com"),
            ]
        );
        assert_eq!(fixture.shipper.connector.connects.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_rotated_credentials_reconnect() -> anyhow::Result<()> {
        let fixture = Fixture::new(&[("me@example.com", "old")])?;
        fixture.shipper.put_log_event("before", None).await;
        fixture.shipper.put_log_event("still before", None).await;

        let mut users = UserTable::load(&fixture.shipper.users_file)?;
        users.insert(
            "me@example.com",
            User {
                access_key: "new".into(),
                secret_key: "secret".into(),
                ..User::default()
            },
        );
        record::write(&fixture.shipper.users_file, &users)?;
        fixture.shipper.put_log_event("after", None).await;

        let keys: Vec<String> = fixture.calls().into_iter().map(|call| call.key).collect();
        assert_eq!(keys, vec!["old", "old", "new"]);
        assert_eq!(fixture.shipper.connector.connects.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_no_identity() -> anyhow::Result<()> {
        let fixture = Fixture::new(&[])?;
        fixture.shipper.put_log_event("nobody", None).await;
        assert!(fixture.calls().is_empty());

        let fixture = Fixture::new(&[("me@example.com", "")])?;
        fixture.shipper.put_log_event("no key", None).await;
        assert!(fixture.calls().is_empty());

        Ok(())
    }
}
