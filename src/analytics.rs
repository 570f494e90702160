//! In-session analytics aggregation.
//!
//! Counters live inside the session and are bumped synchronously under its
//! lock; everything that touches the persistent store happens on spawned
//! tasks so a slow or failing store never stalls command processing.
//! Storage failures are logged and swallowed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use huddle_proto::EndReason;

use crate::db::{
    Activity, AnalyticsStore, NewParticipantRecord, NewSessionRecord, ParticipantFinal,
    SessionFinal,
};
use crate::state::session::{Participant, Session};

/// Bridges live sessions to the persistent analytics store.
pub struct Aggregator {
    store: Arc<dyn AnalyticsStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    /// Open the session record and the host's participant record.
    ///
    /// Called right after the session is created, while the caller still
    /// holds the write guard; the spawned task writes the handles back once
    /// the store returns, re-checking the instance id in case the session
    /// was superseded in between.
    pub fn open_session(&self, session: &Session, handle: Arc<RwLock<Session>>) {
        let store = Arc::clone(&self.store);
        let instance_id = session.instance_id;
        let record = OwnedSessionRecord {
            session_id: session.session_id.clone(),
            instance_id: instance_id.to_string(),
            title: session.title.clone(),
            host_identity: session.host_identity.clone(),
            host_display_name: session.host_display_name.clone(),
            started_at: session.created_at.timestamp(),
        };
        let host = session
            .find_by_identity(&session.host_identity)
            .map(|p| (p.identity.clone(), p.display_name.clone(), p.kind, p.joined_at));

        tokio::spawn(async move {
            let session_record = match store
                .create_session_record(NewSessionRecord {
                    session_id: &record.session_id,
                    instance_id: &record.instance_id,
                    title: &record.title,
                    host_identity: &record.host_identity,
                    host_display_name: &record.host_display_name,
                    started_at: record.started_at,
                })
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(session_id = %record.session_id, error = %e, "Failed to open session record");
                    return;
                }
            };

            let host_record = match &host {
                Some((identity, display_name, kind, joined_at)) => store
                    .create_participant_record(NewParticipantRecord {
                        session_record,
                        identity,
                        display_name,
                        kind: *kind,
                        joined_at: joined_at.timestamp(),
                    })
                    .await
                    .map_err(|e| {
                        warn!(session_id = %record.session_id, error = %e, "Failed to open host participant record");
                        e
                    })
                    .ok(),
                None => None,
            };

            let mut session = handle.write().await;
            if session.instance_id != instance_id {
                return;
            }
            session.analytics.session_record = Some(session_record);
            if let (Some(id), Some((identity, ..))) = (host_record, host) {
                session.analytics.participant_records.insert(identity, id);
            }
        });
    }

    /// Open a participant record for a fresh (non-host) join.
    ///
    /// Skipped with a debug log when the session record is not open yet;
    /// the record set is best-effort, never load-bearing.
    pub fn open_participant(
        &self,
        session: &Session,
        participant: &Participant,
        handle: Arc<RwLock<Session>>,
    ) {
        let Some(session_record) = session.analytics.session_record else {
            debug!(
                session_id = %session.session_id,
                identity = %participant.identity,
                "No session record yet; skipping participant record"
            );
            return;
        };

        let store = Arc::clone(&self.store);
        let instance_id = session.instance_id;
        let session_id = session.session_id.clone();
        let identity = participant.identity.clone();
        let display_name = participant.display_name.clone();
        let kind = participant.kind;
        let joined_at = participant.joined_at.timestamp();

        tokio::spawn(async move {
            match store
                .create_participant_record(NewParticipantRecord {
                    session_record,
                    identity: &identity,
                    display_name: &display_name,
                    kind,
                    joined_at,
                })
                .await
            {
                Ok(id) => {
                    let mut session = handle.write().await;
                    if session.instance_id == instance_id {
                        session.analytics.participant_records.insert(identity, id);
                    }
                }
                Err(e) => {
                    warn!(session_id = %session_id, identity = %identity, error = %e, "Failed to open participant record");
                }
            }
        });
    }

    /// Count one activity event against the session and its originator.
    pub fn record_activity(&self, session: &mut Session, identity: &str, activity: Activity) {
        match activity {
            Activity::Message => session.analytics.messages += 1,
            Activity::Reaction => session.analytics.reactions += 1,
            Activity::Question => session.analytics.questions += 1,
            Activity::HandRaise => session.analytics.hand_raises += 1,
        }

        if let Some(participant) = session
            .participants
            .values_mut()
            .find(|p| p.identity == identity)
        {
            match activity {
                Activity::Message => participant.tally.messages += 1,
                Activity::Reaction => participant.tally.reactions += 1,
                Activity::Question => participant.tally.questions += 1,
                Activity::HandRaise => participant.tally.hand_raises += 1,
            }
        }

        if let Some(&record) = session.analytics.participant_records.get(identity) {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                if let Err(e) = store.bump_participant_activity(record, activity).await {
                    debug!(record, error = %e, "Failed to bump participant activity");
                }
            });
        }
    }

    /// Flush a departing participant's final counters.
    pub fn finalize_participant(
        &self,
        session: &Session,
        participant: &Participant,
        left_at: DateTime<Utc>,
    ) {
        let Some(&record) = session
            .analytics
            .participant_records
            .get(&participant.identity)
        else {
            return;
        };

        let store = Arc::clone(&self.store);
        let fin = ParticipantFinal {
            left_at: left_at.timestamp(),
            duration_secs: (left_at - participant.joined_at).num_seconds().max(0),
            messages: participant.tally.messages,
            reactions: participant.tally.reactions,
            questions: participant.tally.questions,
            hand_raises: participant.tally.hand_raises,
        };
        let identity = participant.identity.clone();
        tokio::spawn(async move {
            if let Err(e) = store.finalize_participant_record(record, fin).await {
                warn!(record, identity = %identity, error = %e, "Failed to finalize participant record");
            }
        });
    }

    /// Flush the final session aggregate and every remaining participant's
    /// record. Called from the shared teardown path.
    pub fn finalize_session(&self, session: &Session, reason: EndReason, ended_at: DateTime<Utc>) {
        for participant in session.participants.values() {
            self.finalize_participant(session, participant, ended_at);
        }

        let Some(record) = session.analytics.session_record else {
            debug!(session_id = %session.session_id, "No session record to finalize");
            return;
        };

        let store = Arc::clone(&self.store);
        let session_id = session.session_id.clone();
        let fin = SessionFinal {
            ended_at: ended_at.timestamp(),
            reason,
            duration_secs: (ended_at - session.created_at).num_seconds().max(0),
            messages: session.analytics.messages,
            reactions: session.analytics.reactions,
            questions: session.analytics.questions,
            hand_raises: session.analytics.hand_raises,
            peak_participants: session.analytics.peak_participants,
        };
        tokio::spawn(async move {
            if let Err(e) = store.finalize_session_record(record, fin).await {
                warn!(session_id = %session_id, error = %e, "Failed to finalize session record");
            }
        });
    }
}

/// Owned snapshot of the session fields the open task needs.
struct OwnedSessionRecord {
    session_id: String,
    instance_id: String,
    title: String,
    host_identity: String,
    host_display_name: String,
    started_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NoopStore;
    use crate::state::session::VerifiedIdentity;
    use huddle_proto::{CallerKind, Role};
    use uuid::Uuid;

    fn who(identity: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            identity: identity.into(),
            display_name: identity.to_uppercase(),
            kind: CallerKind::Staff,
        }
    }

    #[tokio::test]
    async fn activity_counts_session_and_originator() {
        let aggregator = Aggregator::new(Arc::new(NoopStore::new()));
        let host = who("host");
        let mut session = Session::new("m1".into(), "t".into(), &host, None, None);
        session.insert_participant(Participant::new(
            &host,
            Uuid::new_v4(),
            Role::Host,
            true,
            true,
            None,
        ));

        aggregator.record_activity(&mut session, "host", Activity::Message);
        aggregator.record_activity(&mut session, "host", Activity::HandRaise);
        aggregator.record_activity(&mut session, "ghost", Activity::Message);

        assert_eq!(session.analytics.messages, 2);
        assert_eq!(session.analytics.hand_raises, 1);
        let host = session.find_by_identity("host").unwrap();
        assert_eq!(host.tally.messages, 1);
        assert_eq!(host.tally.hand_raises, 1);
    }

    #[tokio::test]
    async fn open_session_writes_handles_back() {
        let aggregator = Aggregator::new(Arc::new(NoopStore::new()));
        let host = who("host");
        let mut session = Session::new("m1".into(), "t".into(), &host, None, None);
        session.insert_participant(Participant::new(
            &host,
            Uuid::new_v4(),
            Role::Host,
            true,
            true,
            None,
        ));
        let handle = Arc::new(RwLock::new(session));

        {
            let session = handle.read().await;
            aggregator.open_session(&session, Arc::clone(&handle));
        }

        // give the spawned task a turn
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let session = handle.read().await;
        assert!(session.analytics.session_record.is_some());
        assert!(session.analytics.participant_records.contains_key("host"));
    }
}
