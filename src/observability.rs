use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("memchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("memchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("memchat.client.request_duration_seconds");

pub(crate) static AUTH_REQUESTS: Counter = Counter::new("memchat.auth.requests");
pub(crate) static AUTH_FAILURES: Counter = Counter::new("memchat.auth.failures");
pub(crate) static AUTH_REFRESHES: Counter = Counter::new("memchat.auth.refreshes");

pub(crate) static SESSION_LOGINS: Counter = Counter::new("memchat.session.logins");
pub(crate) static SESSION_SENDS: Counter = Counter::new("memchat.session.sends");
pub(crate) static SESSION_SEND_FAILURES: Counter = Counter::new("memchat.session.send_failures");
pub(crate) static SESSION_SENDS_IGNORED: Counter = Counter::new("memchat.session.sends_ignored");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("memchat.session.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&AUTH_REQUESTS);
    collector.register_counter(&AUTH_FAILURES);
    collector.register_counter(&AUTH_REFRESHES);

    collector.register_counter(&SESSION_LOGINS);
    collector.register_counter(&SESSION_SENDS);
    collector.register_counter(&SESSION_SEND_FAILURES);
    collector.register_counter(&SESSION_SENDS_IGNORED);
    collector.register_moments(&SESSION_TURN_DURATION);
}
