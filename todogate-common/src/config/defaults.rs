use std::time::Duration;

use crate::{ListenEndpoint, Secret};

pub(crate) const fn _default_true() -> bool {
    true
}

pub(crate) const fn _default_queue_limit() -> u32 {
    0
}

#[inline]
pub(crate) fn _default_database_url() -> Secret {
    Secret::new("sqlite:data")
}

#[inline]
pub(crate) fn _default_http_listen() -> ListenEndpoint {
    ListenEndpoint::all_interfaces(8080)
}

#[inline]
pub(crate) fn _default_session_max_age() -> Duration {
    Duration::from_secs(60 * 30)
}

#[inline]
pub(crate) fn _default_api_token_ttl() -> Duration {
    Duration::from_secs(60 * 60 * 24 * 7)
}
