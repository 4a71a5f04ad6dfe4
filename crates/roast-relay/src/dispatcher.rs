// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Viewer command dispatch.
//!
//! Maps one inbound control frame to state-machine and gateway calls and
//! produces the reply for the originating viewer, if any.

use crate::error::{RelayError, Result};
use crate::protocol::{ControlCommand, ServerMessage};
use crate::session::SessionStateMachine;
use crate::store::{self, SharedGateway};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Stateless request/response mapper.
#[derive(Clone)]
pub struct CommandDispatcher {
    session: Arc<SessionStateMachine>,
    store: SharedGateway,
}

impl CommandDispatcher {
    pub fn new(session: Arc<SessionStateMachine>, store: SharedGateway) -> Self {
        Self { session, store }
    }

    /// Decode and dispatch one text frame.
    ///
    /// `Ok(None)` means nothing is sent back. `Err(MalformedCommand)` means
    /// the caller must end this viewer's command loop.
    pub async fn handle_frame(&self, text: &str) -> Result<Option<ServerMessage>> {
        match ControlCommand::decode(text)? {
            Some(command) => self.dispatch(command).await,
            None => {
                debug!("Ignoring frame without a command: {}", text);
                Ok(None)
            }
        }
    }

    /// Execute a decoded command.
    pub async fn dispatch(&self, command: ControlCommand) -> Result<Option<ServerMessage>> {
        match command {
            ControlCommand::Start { session_name } => self.start(session_name).await.map(Some),
            ControlCommand::Stop => {
                self.stop().await;
                Ok(None)
            }
            ControlCommand::Get => self.get().await.map(Some),
            ControlCommand::Unknown(cmd) => {
                warn!("'{}' is not a valid command", cmd);
                Err(RelayError::MalformedCommand(format!("unknown command '{}'", cmd)))
            }
        }
    }

    async fn start(&self, name: String) -> Result<ServerMessage> {
        let _commands = self.session.lock_commands().await;
        let session = match self.session.start(&name) {
            Ok(session) => session,
            Err(RelayError::AlreadyActive) => {
                return Ok(ServerMessage::start_failed(
                    RelayError::AlreadyActive.to_string(),
                ))
            }
            Err(e) => return Err(e),
        };

        let (id, name, created_at) = (
            session.id.clone(),
            session.name.clone(),
            session.created_at_ms,
        );
        match store::call(&self.store, move |s| s.create_session(&id, &name, created_at)).await {
            Ok(()) => Ok(ServerMessage::session_started(&session)),
            Err(e) => {
                error!("Could not record session {}: {}", session.id, e);
                // keep live and durable state in agreement
                self.session.abort(&session.id);
                Ok(ServerMessage::start_failed("could not create session"))
            }
        }
    }

    async fn stop(&self) {
        let _commands = self.session.lock_commands().await;
        let Some((session, ended_at)) = self.session.close() else {
            return;
        };

        let id = session.id.clone();
        if let Err(e) = store::call(&self.store, move |s| s.end_session(&id, ended_at)).await {
            error!("Could not record end of session {}: {}", session.id, e);
        } else {
            info!("Session {} '{}' closed", session.id, session.name);
        }
    }

    async fn get(&self) -> Result<ServerMessage> {
        let Some(session) = self.session.current() else {
            return Ok(ServerMessage::no_session());
        };

        let id = session.id.clone();
        let history = store::call(&self.store, move |s| {
            Ok((s.list_samples(&id)?, s.list_marks(&id)?))
        })
        .await;

        match history {
            Ok((temps, marks)) => Ok(ServerMessage::session_snapshot(&session, temps, marks)),
            Err(e) => {
                error!("Could not load history of session {}: {}", session.id, e);
                Ok(ServerMessage::session_unavailable(&session))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{now_millis, Sample};
    use crate::sqlite::SqliteStore;
    use crate::store::{Mark, PersistenceGateway, SessionRecord};
    use std::time::Duration;

    fn dispatcher() -> (CommandDispatcher, Arc<SessionStateMachine>, Arc<SqliteStore>) {
        let session = Arc::new(SessionStateMachine::new());
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let shared: SharedGateway = store.clone();
        (
            CommandDispatcher::new(Arc::clone(&session), shared),
            session,
            store,
        )
    }

    /// Gateway whose writes always fail.
    struct BrokenStore;

    impl PersistenceGateway for BrokenStore {
        fn create_session(&self, _: &str, _: &str, _: i64) -> anyhow::Result<()> {
            anyhow::bail!("database is locked")
        }
        fn end_session(&self, _: &str, _: i64) -> anyhow::Result<()> {
            anyhow::bail!("database is locked")
        }
        fn delete_session(&self, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("database is locked")
        }
        fn append_sample(&self, _: &str, _: &Sample) -> anyhow::Result<()> {
            anyhow::bail!("database is locked")
        }
        fn list_sessions(&self) -> anyhow::Result<Vec<SessionRecord>> {
            anyhow::bail!("database is locked")
        }
        fn list_samples(&self, _: &str) -> anyhow::Result<Vec<Sample>> {
            anyhow::bail!("database is locked")
        }
        fn list_marks(&self, _: &str) -> anyhow::Result<Vec<Mark>> {
            anyhow::bail!("database is locked")
        }
        fn record_mark(&self, _: &Mark) -> anyhow::Result<bool> {
            anyhow::bail!("database is locked")
        }
    }

    /// SQLite gateway whose session creation is slow.
    struct SlowCreateStore {
        inner: SqliteStore,
        delay: Duration,
    }

    impl PersistenceGateway for SlowCreateStore {
        fn create_session(&self, id: &str, name: &str, created_at_ms: i64) -> anyhow::Result<()> {
            std::thread::sleep(self.delay);
            self.inner.create_session(id, name, created_at_ms)
        }
        fn end_session(&self, id: &str, ended_at_ms: i64) -> anyhow::Result<()> {
            self.inner.end_session(id, ended_at_ms)
        }
        fn delete_session(&self, id: &str) -> anyhow::Result<()> {
            self.inner.delete_session(id)
        }
        fn append_sample(&self, session_id: &str, sample: &Sample) -> anyhow::Result<()> {
            self.inner.append_sample(session_id, sample)
        }
        fn list_sessions(&self) -> anyhow::Result<Vec<SessionRecord>> {
            self.inner.list_sessions()
        }
        fn list_samples(&self, session_id: &str) -> anyhow::Result<Vec<Sample>> {
            self.inner.list_samples(session_id)
        }
        fn list_marks(&self, session_id: &str) -> anyhow::Result<Vec<Mark>> {
            self.inner.list_marks(session_id)
        }
        fn record_mark(&self, mark: &Mark) -> anyhow::Result<bool> {
            self.inner.record_mark(mark)
        }
    }

    #[tokio::test]
    async fn start_creates_durable_session() {
        let (dispatcher, session, store) = dispatcher();

        let reply = dispatcher
            .handle_frame(r#"{"cmd":"start","session_name":"Batch1"}"#)
            .await
            .unwrap()
            .unwrap();

        let active = session.current().unwrap();
        match reply {
            ServerMessage::StartResponse {
                session_id,
                session_name,
                error,
                ..
            } => {
                assert_eq!(session_id.as_deref(), Some(active.id.as_str()));
                assert_eq!(session_name.as_deref(), Some("Batch1"));
                assert!(error.is_none());
            }
            other => panic!("Expected StartResponse, got {:?}", other),
        }

        let records = store.list_sessions().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, active.id);
        assert_eq!(records[0].created_at_ms, active.created_at_ms);
    }

    #[tokio::test]
    async fn second_start_reports_already_active() {
        let (dispatcher, session, store) = dispatcher();
        dispatcher
            .dispatch(ControlCommand::Start {
                session_name: "Batch1".into(),
            })
            .await
            .unwrap();
        let original = session.current().unwrap();

        let reply = dispatcher
            .dispatch(ControlCommand::Start {
                session_name: "Batch2".into(),
            })
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            reply,
            ServerMessage::StartResponse { error: Some(true), .. }
        ));
        assert_eq!(session.current().unwrap(), original);
        assert_eq!(store.list_sessions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_rolls_back_when_store_fails() {
        let session = Arc::new(SessionStateMachine::new());
        let dispatcher = CommandDispatcher::new(Arc::clone(&session), Arc::new(BrokenStore));

        let reply = dispatcher
            .dispatch(ControlCommand::Start {
                session_name: "Batch1".into(),
            })
            .await
            .unwrap()
            .unwrap();

        match reply {
            ServerMessage::StartResponse { error, msg, .. } => {
                assert_eq!(error, Some(true));
                // backend text stays internal
                assert!(!msg.contains("locked"));
            }
            other => panic!("Expected StartResponse, got {:?}", other),
        }
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn stop_ends_session_and_is_idempotent() {
        let (dispatcher, session, store) = dispatcher();
        dispatcher
            .handle_frame(r#"{"cmd":"start","session_name":"Batch1"}"#)
            .await
            .unwrap();

        assert!(dispatcher.handle_frame(r#"{"cmd":"stop"}"#).await.unwrap().is_none());
        assert!(!session.is_active());
        let records = store.list_sessions().unwrap();
        assert!(records[0].is_ended());
        assert!(records[0].ended_at_ms >= records[0].created_at_ms);

        // idle stop: no reply, no error, no state change
        assert!(dispatcher.handle_frame(r#"{"cmd":"stop"}"#).await.unwrap().is_none());
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn stop_during_slow_start_leaves_no_open_session() {
        let session = Arc::new(SessionStateMachine::new());
        let store = Arc::new(SlowCreateStore {
            inner: SqliteStore::new_in_memory().unwrap(),
            delay: Duration::from_millis(200),
        });
        let shared: SharedGateway = store.clone();
        let dispatcher = CommandDispatcher::new(Arc::clone(&session), shared);

        let starter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(ControlCommand::Start {
                        session_name: "A".into(),
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        // another viewer
        dispatcher.dispatch(ControlCommand::Stop).await.unwrap();

        let reply = starter.await.unwrap().unwrap().unwrap();
        assert!(matches!(
            reply,
            ServerMessage::StartResponse { error: None, .. }
        ));
        assert!(!session.is_active());

        let records = store.list_sessions().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_ended());
    }

    #[tokio::test]
    async fn stop_right_after_sample_ends_after_it() {
        let (dispatcher, session, store) = dispatcher();
        for _ in 0..50 {
            dispatcher
                .dispatch(ControlCommand::Start {
                    session_name: "Batch".into(),
                })
                .await
                .unwrap();
            let ts = now_millis();
            let id = session.admit(ts).unwrap();
            store.append_sample(&id, &Sample::new(1.0, ts)).unwrap();
            dispatcher.dispatch(ControlCommand::Stop).await.unwrap();
        }

        for record in store.list_sessions().unwrap() {
            for sample in store.list_samples(&record.id).unwrap() {
                assert!(sample.timestamp_ms >= record.created_at_ms);
                assert!(sample.timestamp_ms < record.ended_at_ms);
            }
        }
    }

    #[tokio::test]
    async fn get_while_idle() {
        let (dispatcher, _, _) = dispatcher();
        let reply = dispatcher.dispatch(ControlCommand::Get).await.unwrap().unwrap();
        let json = serde_json::to_value(reply).unwrap();
        assert_eq!(json["has_session"], false);
        assert_eq!(json["error"], true);
    }

    #[tokio::test]
    async fn get_returns_history_of_active_session() {
        let (dispatcher, session, store) = dispatcher();
        dispatcher
            .dispatch(ControlCommand::Start {
                session_name: "Batch1".into(),
            })
            .await
            .unwrap();
        let active = session.current().unwrap();

        store
            .append_sample(&active.id, &Sample::new(180.0, active.created_at_ms + 1))
            .unwrap();
        store
            .record_mark(&Mark {
                session_id: active.id.clone(),
                name: "Charge".into(),
                created_at_ms: active.created_at_ms + 2,
                temperature: 180.0,
            })
            .unwrap();

        let reply = dispatcher.dispatch(ControlCommand::Get).await.unwrap().unwrap();
        let json = serde_json::to_value(reply).unwrap();
        assert_eq!(json["has_session"], true);
        assert_eq!(json["error"], false);
        assert_eq!(json["session_id"], active.id.as_str());
        assert_eq!(json["session_created_at"], active.created_at_ms);
        assert_eq!(json["temps"][0]["temp"], 180.0);
        assert_eq!(json["marks"][0]["mark_name"], "Charge");
    }

    #[tokio::test]
    async fn unknown_command_ends_loop() {
        let (dispatcher, _, _) = dispatcher();
        assert!(matches!(
            dispatcher.handle_frame(r#"{"cmd":"shutdown"}"#).await,
            Err(RelayError::MalformedCommand(_))
        ));
    }

    #[tokio::test]
    async fn frame_without_cmd_is_noop() {
        let (dispatcher, session, _) = dispatcher();
        assert!(dispatcher
            .handle_frame(r#"{"session_name":"x"}"#)
            .await
            .unwrap()
            .is_none());
        assert!(!session.is_active());
    }
}
