//! Authenticated session and paginated hands iterator.
use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;

use hl_core::Credentials;
use hl_core::Seq;

use super::record::Record;

/// Login failed. The binary maps this to exit code 2.
#[derive(Debug)]
pub struct AuthError(pub String);

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "authentication error: {}", self.0)
    }
}
impl std::error::Error for AuthError {}

fn csrf_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r#"name="csrfmiddlewaretoken" value="(.+?)""#).expect("csrf regex")
    })
}

fn offset_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"offset=(\d+)").expect("offset regex"))
}

/// An authenticated session against the hand-history API. The cookie jar
/// carries the admin session established by the CSRF handshake.
pub struct Session {
    http: reqwest::blocking::Client,
    base: String,
    organizer: String,
    event: String,
    limit: usize,
}

impl Session {
    /// Performs the login handshake and returns a ready session. Every
    /// failure on this path is an [`AuthError`]: the driver cannot proceed
    /// without a session.
    pub fn login(
        base: &str,
        organizer: &str,
        event: &str,
        limit: usize,
        creds: &Credentials,
    ) -> Result<Self, AuthError> {
        let http = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(hl_core::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError(format!("client build: {}", e)))?;
        let login_page = format!("{}/admin/login/?next=/admin/", base);
        let html = http
            .get(&login_page)
            .timeout(Duration::from_secs(hl_core::LOGIN_TIMEOUT_SECS))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| AuthError(format!("login page: {}", e)))?;
        let token = csrf_re()
            .captures(&html)
            .map(|cap| cap[1].to_string())
            .ok_or_else(|| AuthError("could not find CSRF token".into()))?;
        http.post(format!("{}/admin/login/", base))
            .timeout(Duration::from_secs(hl_core::LOGIN_TIMEOUT_SECS))
            .header(reqwest::header::REFERER, &login_page)
            .form(&[
                ("username", creds.username.as_str()),
                ("password", creds.password.as_str()),
                ("csrfmiddlewaretoken", token.as_str()),
                ("next", "/admin/"),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError(format!("login post: {}", e)))?;
        log::info!("authenticated against {}", base);
        Ok(Self {
            http,
            base: base.to_string(),
            organizer: organizer.to_string(),
            event: event.to_string(),
            limit,
        })
    }

    /// Lazy sequence of `(seq, hand)` for one date. The iterator follows
    /// the `next` URL chain until exhausted; 404 (date not yet available),
    /// timeouts, and malformed JSON all end it cleanly — the outer driver
    /// re-enters the date on its next cycle.
    pub fn iter_hands(&self, date: &str) -> HandsForDate<'_> {
        let url = format!(
            "{}/v1/solver/power_ranking/organizers/{}/events/{}/episodes/Ep{}/hands?limit={}&offset=0",
            self.base, self.organizer, self.event, date, self.limit
        );
        log::info!("fetching hands from {}", url);
        HandsForDate {
            session: self,
            date: date.to_string(),
            next_url: Some(url),
            queue: VecDeque::new(),
            total: 0,
        }
    }
}

/// Iterator state for one date's pagination.
pub struct HandsForDate<'a> {
    session: &'a Session,
    date: String,
    next_url: Option<String>,
    queue: VecDeque<(Seq, Record)>,
    total: usize,
}

impl HandsForDate<'_> {
    /// Hands yielded so far.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Fetches the next page into the queue. Any terminal condition clears
    /// `next_url`.
    fn fetch(&mut self) {
        let Some(url) = self.next_url.take() else {
            return;
        };
        let Some(offset) = offset_re()
            .captures(&url)
            .and_then(|cap| cap[1].parse::<Seq>().ok())
        else {
            log::warn!("no offset in page url, stopping: {}", url);
            return;
        };
        let response = match self.session.http.get(&url).send() {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                log::warn!("timeout at offset {} for {}: {}", offset, self.date, e);
                return;
            }
            Err(e) => {
                log::warn!("network error for {}: {}", self.date, e);
                return;
            }
        };
        match response.status().as_u16() {
            200 => {}
            404 => {
                log::info!("date {} not yet available (episode missing)", self.date);
                return;
            }
            status => {
                log::warn!("HTTP {} at offset {} for {}", status, offset, self.date);
                return;
            }
        }
        let page: serde_json::Value = match response.json() {
            Ok(v) => v,
            Err(e) => {
                log::warn!("malformed JSON at offset {}: {}", offset, e);
                return;
            }
        };
        let results = page
            .get("results")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        log::debug!("page at offset {}: {} hands", offset, results.len());
        for (i, hand) in results.into_iter().enumerate() {
            self.queue.push_back((offset + i as Seq, Record::from(hand)));
        }
        self.next_url = page
            .get("next")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
    }
}

impl Iterator for HandsForDate<'_> {
    type Item = (Seq, Record);

    fn next(&mut self) -> Option<Self::Item> {
        while self.queue.is_empty() && self.next_url.is_some() {
            self.fetch();
        }
        let item = self.queue.pop_front();
        if item.is_some() {
            self.total += 1;
        } else {
            log::info!("fetched {} hands for {}", self.total, self.date);
        }
        item
    }
}
