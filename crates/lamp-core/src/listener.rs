//! Background reader for one gateway transport.
//!
//! The listener is the only consumer of the inbound half. It classifies
//! each frame and routes it: notifications go to the [`Notifier`], level
//! answers go through the quirk correction into the [`Correlator`], scene
//! echoes update the [`QuirkFlag`]. Malformed frames are logged and
//! skipped; only a read error, end of stream, or cancellation ends the
//! loop. On exit the listener drops the inbound half and abandons any
//! pending query.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lamp_api::FrameStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{Answer, Frame, classify};
use crate::correlator::Correlator;
use crate::notify::Notifier;
use crate::quirk::QuirkFlag;

/// Shared state the listener routes into.
#[derive(Clone)]
pub struct ListenerContext {
    pub correlator: Arc<Correlator>,
    pub quirk: Arc<QuirkFlag>,
    pub notifier: Arc<dyn Notifier>,
    /// Delay before forwarding scene-related notifications.
    pub settle_interval: Duration,
}

/// Why a listener loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// Cancelled by its owner.
    Stopped,
    /// The gateway closed the stream.
    StreamEnded,
    /// Reading failed; the link is dead.
    ReadFailed(String),
}

/// Owner's handle on a running listener.
#[derive(Debug)]
pub struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<ListenerExit>,
}

impl ListenerHandle {
    /// Start a listener on `stream`.
    pub fn spawn(stream: FrameStream, ctx: ListenerContext) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listen(stream, ctx, cancel.clone()));
        Self { cancel, task }
    }

    /// `false` once the loop has exited for any reason.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the loop and wait until it has fully stopped.
    pub async fn stop(self) -> ListenerExit {
        self.cancel.cancel();
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => ListenerExit::ReadFailed(format!("listener task failed: {e}")),
        }
    }
}

async fn listen(
    mut stream: FrameStream,
    ctx: ListenerContext,
    cancel: CancellationToken,
) -> ListenerExit {
    debug!("listener started");

    let exit = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break ListenerExit::Stopped,
            next = stream.next() => match next {
                Some(Ok(raw)) => handle_frame(&raw, &ctx, &cancel),
                Some(Err(e)) => break ListenerExit::ReadFailed(e.to_string()),
                None => break ListenerExit::StreamEnded,
            },
        }
    };

    drop(stream);
    if ctx.correlator.abandon() {
        debug!("pending query abandoned");
    }

    match &exit {
        ListenerExit::Stopped => debug!("listener stopped"),
        ListenerExit::StreamEnded => info!("gateway closed the connection"),
        ListenerExit::ReadFailed(reason) => warn!(%reason, "gateway read failed, listener exiting"),
    }
    exit
}

/// Route one raw frame. Never blocks on I/O.
pub(crate) fn handle_frame(raw: &str, ctx: &ListenerContext, cancel: &CancellationToken) {
    debug!(frame = raw, "frame from gateway");

    match classify(raw) {
        Frame::Notification { scene_related } => forward_notification(ctx, scene_related, cancel),
        Frame::Answer(Answer::ChannelLevel { level }) => {
            let delivered = ctx
                .quirk
                .take_corrected(level, |corrected| ctx.correlator.deliver(corrected));
            if !delivered {
                debug!(level, "level answer with no pending query, dropped");
            }
        }
        Frame::Answer(Answer::SceneSet { scene }) => {
            if scene == 0 {
                ctx.quirk.set();
                debug!("scene 0 confirmed, level answers read as off");
            }
        }
        Frame::Answer(Answer::Other { id }) => debug!(id, "ignoring answer"),
        Frame::Unrecognized { reason } => warn!(%reason, "unrecognized frame from gateway"),
    }
}

fn forward_notification(ctx: &ListenerContext, scene_related: bool, cancel: &CancellationToken) {
    let notifier = Arc::clone(&ctx.notifier);
    if !scene_related {
        tokio::spawn(async move { notifier.notify().await });
        return;
    }

    // Scene changes ramp over a few seconds; report once they have settled.
    let settle = ctx.settle_interval;
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = cancel.cancelled() => debug!("settle wait cancelled"),
            () = tokio::time::sleep(settle) => notifier.notify().await,
        }
    });
}
