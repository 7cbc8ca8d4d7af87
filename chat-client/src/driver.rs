//! Timer task that drives a [`ChatClient`]'s poller.
//!
//! The client decides when the timer should be armed or cancelled; the
//! driver owns the `tokio::time::Interval` and feeds it ticks. Visibility
//! changes and shutdown arrive as commands over a channel and take priority
//! over a due tick. A driver belongs to the session it was started in and
//! exits once that session ends.

use std::sync::Arc;
use std::time::Duration;

use flowchat_core::PollPhase;
use flowchat_types::Timestamp;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::api::ChatApi;
use crate::client::{ChatClient, ClientError, TickOutcome, TimerChange};
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Suspend,
    Resume,
    Stop,
}

/// Handle to a running poll task.
///
/// Dropping the handle without calling [`stop`](Self::stop) also stops the
/// task at its next wake-up.
#[derive(Debug)]
pub struct PollDriver {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl PollDriver {
    /// Start polling and spawn the timer task.
    ///
    /// The initial fetch completes before this returns.
    pub async fn start<A, S>(
        client: Arc<ChatClient<A, S>>,
        initial: Option<Timestamp>,
    ) -> Result<Self, ClientError>
    where
        A: ChatApi + 'static,
        S: KeyValueStore + 'static,
    {
        let transition = client.start(initial).await?;
        let generation = client.session_generation();
        let (commands, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(client, rx, transition.timer, generation));
        Ok(Self { commands, task })
    }

    /// Page became hidden.
    pub async fn suspend(&self) {
        self.send(Command::Suspend).await;
    }

    /// Page became visible.
    pub async fn resume(&self) {
        self.send(Command::Resume).await;
    }

    /// Forward a visibility change.
    pub async fn set_visible(&self, visible: bool) {
        if visible {
            self.resume().await;
        } else {
            self.suspend().await;
        }
    }

    /// Whether the task has exited (stopped, logged out, or session invalid).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling and wait for the task to exit.
    pub async fn stop(self) {
        self.send(Command::Stop).await;
        if let Err(e) = self.task.await {
            debug!(error = %e, "poll task ended abnormally");
        }
    }

    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            debug!(?command, "poll task already finished");
        }
    }
}

fn apply(timer: &mut Option<Interval>, change: TimerChange) {
    match change {
        TimerChange::Arm(period) => *timer = Some(interval(period)),
        TimerChange::Cancel => *timer = None,
        TimerChange::Keep => {}
    }
}

fn interval(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    // A tick that fires while the previous one is still running is dropped,
    // not queued.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

enum Wake {
    Command(Option<Command>),
    Tick,
}

async fn run<A, S>(
    client: Arc<ChatClient<A, S>>,
    mut commands: mpsc::Receiver<Command>,
    initial: TimerChange,
    generation: u64,
) where
    A: ChatApi,
    S: KeyValueStore,
{
    let mut timer = None;
    apply(&mut timer, initial);

    loop {
        // A command queued while the previous tick was running wins over a
        // tick that came due meanwhile.
        let wake = tokio::select! {
            biased;
            command = commands.recv() => Wake::Command(command),
            _ = next_tick(&mut timer) => Wake::Tick,
        };

        // The session this driver was started for has ended; a newer one
        // has its own driver.
        if client.session_generation() != generation {
            debug!("session changed, poll task exiting");
            break;
        }

        match wake {
            Wake::Tick => {
                let outcome = client.tick().await;
                client.refresh_presence().await;
                client.expire_typing().await;
                if outcome == TickOutcome::SessionInvalid {
                    break;
                }
            }
            Wake::Command(Some(Command::Suspend)) => apply(&mut timer, client.suspend().await),
            Wake::Command(Some(Command::Resume)) => match client.resume().await {
                Ok(transition) => {
                    apply(&mut timer, transition.timer);
                    if transition.fetch == Some(TickOutcome::SessionInvalid) {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "resume without session");
                    break;
                }
            },
            Wake::Command(Some(Command::Stop) | None) => {
                client.stop().await;
                break;
            }
        }

        if client.poll_phase().await == PollPhase::Idle {
            break;
        }
    }
    debug!("poll task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use crate::client::ClientConfig;
    use crate::storage::MemoryStore;

    type TestClient = ChatClient<MockApi, MemoryStore>;

    async fn logged_in() -> (Arc<TestClient>, MockApi) {
        let api = MockApi::new();
        api.add_account("alice", "secret1");
        let client = ChatClient::new(ClientConfig::default(), api.clone(), MemoryStore::new());
        client.login("alice", "secret1").await.unwrap();
        (Arc::new(client), api)
    }

    async fn sleep_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval() {
        let (client, api) = logged_in().await;
        let driver = PollDriver::start(client.clone(), None).await.unwrap();
        assert_eq!(api.fetch_count(), 1, "immediate initial fetch");

        sleep_ms(1900).await;
        assert_eq!(api.fetch_count(), 1);

        sleep_ms(200).await;
        assert_eq!(api.fetch_count(), 2);

        let m = api.post_as("bob", "hello");
        sleep_ms(2000).await;
        assert_eq!(api.fetch_count(), 3);
        assert_eq!(client.messages().await, vec![m]);

        driver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_page_does_not_poll() {
        let (client, api) = logged_in().await;
        let driver = PollDriver::start(client.clone(), None).await.unwrap();

        driver.set_visible(false).await;
        sleep_ms(10_000).await;
        assert_eq!(api.fetch_count(), 1);
        assert_eq!(client.poll_phase().await, PollPhase::Suspended);

        driver.set_visible(true).await;
        sleep_ms(100).await;
        assert_eq!(api.fetch_count(), 2, "one immediate fetch on resume");

        sleep_ms(2000).await;
        assert_eq!(api.fetch_count(), 3, "timer re-armed");

        driver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_deterministic() {
        let (client, api) = logged_in().await;
        let driver = PollDriver::start(client.clone(), None).await.unwrap();

        driver.stop().await;
        assert_eq!(client.poll_phase().await, PollPhase::Idle);

        sleep_ms(10_000).await;
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_ends_task() {
        let (client, api) = logged_in().await;
        let driver = PollDriver::start(client.clone(), None).await.unwrap();

        client.logout().await.unwrap();
        sleep_ms(2100).await;

        assert!(driver.is_finished());
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_token_ends_task() {
        let (client, api) = logged_in().await;
        let driver = PollDriver::start(client.clone(), None).await.unwrap();

        api.revoke_all_tokens();
        sleep_ms(2100).await;

        assert!(driver.is_finished());
        assert!(client.current_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_refresh_presence() {
        let (client, api) = logged_in().await;
        let driver = PollDriver::start(client.clone(), None).await.unwrap();
        assert_eq!(client.online_users().await.len(), 1, "loaded on start");

        api.add_account("bob", "secret2");
        api.login(&flowchat_types::LoginRequest {
            username: "bob".into(),
            password: "secret2".into(),
        })
        .await
        .unwrap();
        sleep_ms(2100).await;
        assert_eq!(client.online_users().await.len(), 2);

        driver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hide_during_slow_fetch_issues_no_further_fetch() {
        for _ in 0..20 {
            let (client, api) = logged_in().await;
            let driver = PollDriver::start(client.clone(), None).await.unwrap();

            let gate = api.hold_fetches();
            sleep_ms(2100).await;
            assert_eq!(api.fetch_count(), 2, "second fetch is held");

            driver.set_visible(false).await;
            sleep_ms(3000).await;
            gate.release();
            sleep_ms(10_000).await;

            assert_eq!(api.fetch_count(), 2);
            assert_eq!(client.poll_phase().await, PollPhase::Suspended);
            driver.stop().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn driver_from_previous_session_exits() {
        let (client, api) = logged_in().await;
        let old = PollDriver::start(client.clone(), None).await.unwrap();

        client.logout().await.unwrap();
        client.login("alice", "secret1").await.unwrap();
        let current = PollDriver::start(client.clone(), None).await.unwrap();
        assert_eq!(api.fetch_count(), 2);

        sleep_ms(2100).await;
        assert!(old.is_finished());
        assert!(!current.is_finished());
        assert_eq!(api.fetch_count(), 3, "one timer left ticking");

        current.stop().await;
        old.stop().await;
    }

    #[tokio::test]
    async fn start_requires_session() {
        let client = Arc::new(ChatClient::new(
            ClientConfig::default(),
            MockApi::new(),
            MemoryStore::new(),
        ));
        assert!(matches!(
            PollDriver::start(client, None).await,
            Err(ClientError::NotLoggedIn)
        ));
    }
}
