//! Dispatch loop.
//!
//! The single consumer of inbound frames. Meta messages go to the protocol
//! state machine and its actions are carried out before the next frame is
//! read, so resubscriptions triggered by a connect reply are on the wire
//! before any later data message is delivered. Data messages go to the
//! handler registered for their exact channel. A panicking handler is
//! logged and does not stop the loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::client::Shared;
use crate::core::{PushError, PushResult};
use crate::protocol::{InboundMessage, PushMessage, decode_frame};
use crate::transport::FrameSource;

/// Run until the transport ends, fails, or `cancel` fires.
pub(crate) async fn run(
    shared: Arc<Shared>,
    mut source: Box<dyn FrameSource>,
    cancel: CancellationToken,
) {
    let _exit = ExitGuard(Arc::clone(&shared));

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("dispatch loop cancelled");
                break;
            }
            next = source.receive_next() => next,
        };

        match next {
            Ok(Some(frame)) => {
                if let Err(e) = handle_frame(&shared, &frame).await {
                    if matches!(e, PushError::Transport(_) | PushError::Shutdown) {
                        error!(error = %e, "outbound path failed, stopping dispatch");
                        break;
                    }
                    warn!(error = %e, frame = %frame, "dropping inbound frame");
                }
            }
            Ok(None) => {
                info!("push transport ended");
                break;
            }
            Err(e) if !e.is_fatal() => warn!(error = %e, "skipping inbound frame"),
            Err(e) => {
                error!(error = %e, "push transport failed");
                break;
            }
        }
    }

    shared.on_transport_closed().await;
}

async fn handle_frame(shared: &Shared, frame: &str) -> PushResult<()> {
    for message in decode_frame(frame)? {
        if let Some(err) = message.error() {
            error!(error = err, "server reported error");
        }

        match message {
            InboundMessage::Meta(channel, meta) => {
                trace!(channel = channel.as_str(), successful = meta.successful, "incoming meta");
                let actions = shared.protocol.lock().on_meta(channel, &meta);
                shared.perform(actions).await?;
            }
            InboundMessage::Data(message) => deliver(shared, message),
        }
    }
    Ok(())
}

fn deliver(shared: &Shared, message: PushMessage) {
    trace!(channel = %message.channel, "incoming data");
    let Some(handler) = shared.registry.handler(&message.channel) else {
        warn!(channel = %message.channel, "no subscription for channel, dropped");
        return;
    };

    let channel = message.channel.clone();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_message(message))) {
        error!(%channel, panic = %panic_message(&*payload), "message handler panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Reverts the shared state to `Disconnected` however the loop exits,
/// including by unwinding.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.on_dispatch_exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::protocol::ConnectionState;

    fn crash() {
        panic!("dispatch bug");
    }

    fn crash_with(code: u32) {
        panic!("code {code}");
    }

    #[tokio::test]
    async fn test_exit_guard_resets_state_on_unwind() {
        let shared = Arc::new(Shared::new(ClientConfig::default()));
        let _ = shared.protocol.lock().begin("push-1");
        assert_eq!(shared.protocol.lock().state(), ConnectionState::HandshakePending);

        let task_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            let _exit = ExitGuard(task_shared);
            crash();
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(shared.protocol.lock().state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(crash).unwrap_err();
        assert_eq!(panic_message(&*payload), "dispatch bug");

        let payload = panic::catch_unwind(|| crash_with(7)).unwrap_err();
        assert_eq!(panic_message(&*payload), "code 7");
    }
}
