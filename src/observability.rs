use biometrics::{Collector, Counter, Moments};

pub(crate) static FRAMES_RECEIVED: Counter = Counter::new("streamchat.frames.received");
pub(crate) static FRAMES_IGNORED: Counter = Counter::new("streamchat.frames.ignored");
pub(crate) static FRAMES_AFTER_CLOSE: Counter = Counter::new("streamchat.frames.after_close");
pub(crate) static FRAME_BYTES: Counter = Counter::new("streamchat.frames.bytes");

pub(crate) static STREAMS_STARTED: Counter = Counter::new("streamchat.stream.started");
pub(crate) static STREAMS_COMPLETED: Counter = Counter::new("streamchat.stream.completed");
pub(crate) static STREAMS_PREEMPTED: Counter = Counter::new("streamchat.stream.preempted");
pub(crate) static STREAMS_FORCE_FINALIZED: Counter =
    Counter::new("streamchat.stream.force_finalized");
pub(crate) static STREAM_DURATION: Moments = Moments::new("streamchat.stream.duration_seconds");

pub(crate) static SUBMISSIONS_SENT: Counter = Counter::new("streamchat.submit.sent");
pub(crate) static SUBMISSIONS_REJECTED: Counter = Counter::new("streamchat.submit.rejected");
pub(crate) static SUBMISSIONS_UNAVAILABLE: Counter = Counter::new("streamchat.submit.unavailable");

pub(crate) static CHANNEL_ERRORS: Counter = Counter::new("streamchat.channel.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&FRAMES_RECEIVED);
    collector.register_counter(&FRAMES_IGNORED);
    collector.register_counter(&FRAMES_AFTER_CLOSE);
    collector.register_counter(&FRAME_BYTES);

    collector.register_counter(&STREAMS_STARTED);
    collector.register_counter(&STREAMS_COMPLETED);
    collector.register_counter(&STREAMS_PREEMPTED);
    collector.register_counter(&STREAMS_FORCE_FINALIZED);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SUBMISSIONS_SENT);
    collector.register_counter(&SUBMISSIONS_REJECTED);
    collector.register_counter(&SUBMISSIONS_UNAVAILABLE);

    collector.register_counter(&CHANNEL_ERRORS);
}
