use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Sliding-window limiter for answer requests, keyed by session id.
///
/// The supervisor consults this before driving the LLM so a single chat
/// widget cannot monopolize the completion APIs.
pub struct RateLimiter {
    /// Request timestamps per session id.
    requests: HashMap<String, Vec<Instant>>,
    /// Maximum answers allowed within `window`.
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        RateLimiter {
            requests: HashMap::new(),
            limit,
            window,
        }
    }

    /// Default policy: 30 answers per minute per session.
    pub fn per_session_default() -> Self {
        Self::new(30, Duration::from_secs(60))
    }

    /// Records and allows the request if the session is under its limit.
    pub fn check(&mut self, session_id: &str) -> bool {
        let now = Instant::now();
        let window_start = now - self.window;

        let session_requests = self.requests.entry(session_id.to_string()).or_default();
        session_requests.retain(|&timestamp| timestamp > window_start);

        let allowed = session_requests.len() < self.limit;
        if allowed {
            session_requests.push(now);
        }

        // Sessions age out of the map once their window empties, so the
        // map does not grow with every visitor ever seen.
        self.requests.retain(|_, stamps| !stamps.is_empty());

        allowed
    }
}
