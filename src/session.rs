use crate::models::{DataSource, Dataset, UploadInfo};
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "dashboard_session";

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl StoredUpload {
    pub fn info(&self) -> UploadInfo {
        UploadInfo {
            file_name: self.file_name.clone(),
            size: self.bytes.len(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedSample {
    source: DataSource,
    dataset: Dataset,
}

#[derive(Debug, Default)]
struct SessionEntry {
    sample: Option<CachedSample>,
    upload: Option<StoredUpload>,
    last_seen: u64,
}

impl SessionEntry {
    fn upload_len(&self) -> usize {
        self.upload.as_ref().map_or(0, |upload| upload.bytes.len())
    }
}

/// Per-session memo of the generated sample and the last uploaded file.
///
/// Holds at most `capacity` sessions and at most `upload_budget` bytes of
/// uploaded files. Sessions without a file are dropped before sessions with
/// one, least recently seen first; past the byte budget the least recently
/// seen files are released.
#[derive(Debug)]
pub struct SessionStore {
    entries: HashMap<Uuid, SessionEntry>,
    capacity: usize,
    upload_budget: usize,
    upload_bytes: usize,
    clock: u64,
}

impl SessionStore {
    pub fn new(capacity: usize, upload_budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            upload_budget,
            upload_bytes: 0,
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of the uploaded files currently held.
    pub fn upload_bytes(&self) -> usize {
        self.upload_bytes
    }

    fn touch(&mut self, id: Uuid) -> &mut SessionEntry {
        self.clock += 1;
        if !self.entries.contains_key(&id) && self.entries.len() >= self.capacity {
            self.evict_session();
        }
        let entry = self.entries.entry(id).or_default();
        entry.last_seen = self.clock;
        entry
    }

    fn evict_session(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.upload.is_some(), entry.last_seen))
            .map(|(key, _)| *key);
        if let Some(entry) = oldest.and_then(|key| self.entries.remove(&key)) {
            self.upload_bytes -= entry.upload_len();
        }
    }

    /// Releases the least recently seen files, never `keep`'s, until the
    /// stored files fit the byte budget.
    fn enforce_upload_budget(&mut self, keep: Uuid) {
        while self.upload_bytes > self.upload_budget {
            let oldest = self
                .entries
                .iter_mut()
                .filter(|(key, entry)| **key != keep && entry.upload.is_some())
                .min_by_key(|(_, entry)| entry.last_seen);
            let Some((key, entry)) = oldest else {
                break;
            };
            debug!(session = %key, "upload budget exceeded, releasing file");
            self.upload_bytes -= entry.upload_len();
            entry.upload = None;
        }
    }

    /// Returns the session's sample, generating a new one on first use or
    /// when the data-source selector differs from the one it was made under.
    pub fn sample(
        &mut self,
        id: Uuid,
        source: DataSource,
        generate: impl FnOnce() -> Dataset,
    ) -> Dataset {
        let entry = self.touch(id);
        match &entry.sample {
            Some(cached) if cached.source == source => cached.dataset.clone(),
            _ => {
                let dataset = generate();
                entry.sample = Some(CachedSample {
                    source,
                    dataset: dataset.clone(),
                });
                dataset
            }
        }
    }

    /// The session's stored file. Never creates a session.
    pub fn upload(&mut self, id: Uuid) -> Option<StoredUpload> {
        self.clock += 1;
        let entry = self.entries.get_mut(&id)?;
        entry.last_seen = self.clock;
        entry.upload.clone()
    }

    pub fn store_upload(&mut self, id: Uuid, upload: StoredUpload) {
        let added = upload.bytes.len();
        let entry = self.touch(id);
        let replaced = entry.upload_len();
        entry.upload = Some(upload);
        self.upload_bytes = self.upload_bytes - replaced + added;
        self.enforce_upload_budget(id);
    }

    pub fn clear_upload(&mut self, id: Uuid) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        self.upload_bytes -= entry.upload_len();
        entry.upload = None;
    }
}

/// Session identity carried in the `dashboard_session` cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub fresh: bool,
}

impl Session {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok());

        match existing {
            Some(id) => Self { id, fresh: false },
            None => Self {
                id: Uuid::new_v4(),
                fresh: true,
            },
        }
    }

    pub fn cookie(&self) -> String {
        format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            self.id
        )
    }

    /// Issues the cookie when the session was created by this request.
    pub fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.fresh {
            if let Ok(value) = HeaderValue::from_str(&self.cookie()) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::generate_sample;
    use std::cell::Cell;

    #[test]
    fn sample_is_memoized_until_source_changes() {
        let mut store = SessionStore::new(8, usize::MAX);
        let id = Uuid::new_v4();
        let calls = Cell::new(0);
        let generate = || {
            calls.set(calls.get() + 1);
            generate_sample()
        };

        let first = store.sample(id, DataSource::Sample, generate);
        let again = store.sample(id, DataSource::Sample, generate);
        assert_eq!(first, again);
        assert_eq!(calls.get(), 1);

        store.sample(id, DataSource::Upload, generate);
        assert_eq!(calls.get(), 2);
        store.sample(id, DataSource::Upload, generate);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn sessions_do_not_share_samples() {
        let mut store = SessionStore::new(8, usize::MAX);
        let calls = Cell::new(0);
        let generate = || {
            calls.set(calls.get() + 1);
            generate_sample()
        };
        store.sample(Uuid::new_v4(), DataSource::Sample, generate);
        store.sample(Uuid::new_v4(), DataSource::Sample, generate);
        assert_eq!(calls.get(), 2);
        assert_eq!(store.len(), 2);
    }

    fn file(name: &str, bytes: &'static [u8]) -> StoredUpload {
        StoredUpload {
            file_name: name.into(),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn least_recently_seen_session_is_evicted() {
        let mut store = SessionStore::new(2, usize::MAX);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.store_upload(a, file("a.csv", b"x\n1\n"));
        store.store_upload(b, file("b.csv", b"x\n2\n"));
        assert!(store.upload(a).is_some());
        store.store_upload(c, file("c.csv", b"x\n3\n"));

        assert_eq!(store.len(), 2);
        assert!(store.upload(a).is_some());
        assert!(store.upload(b).is_none());
        assert_eq!(store.upload_bytes(), 8);
    }

    #[test]
    fn sessions_without_files_are_evicted_first() {
        let mut store = SessionStore::new(2, usize::MAX);
        let (owner, visitor) = (Uuid::new_v4(), Uuid::new_v4());
        store.store_upload(owner, file("a.csv", b"x\n1\n"));
        store.sample(visitor, DataSource::Sample, generate_sample);

        for _ in 0..5 {
            store.sample(Uuid::new_v4(), DataSource::Sample, generate_sample);
        }
        assert_eq!(store.len(), 2);
        assert!(store.upload(owner).is_some());
    }

    #[test]
    fn reading_an_upload_never_creates_a_session() {
        let mut store = SessionStore::new(1, usize::MAX);
        let owner = Uuid::new_v4();
        store.store_upload(owner, file("a.csv", b"x\n1\n"));

        for _ in 0..10 {
            assert!(store.upload(Uuid::new_v4()).is_none());
            store.clear_upload(Uuid::new_v4());
        }
        assert_eq!(store.len(), 1);
        assert!(store.upload(owner).is_some());
    }

    #[test]
    fn upload_budget_releases_least_recently_seen_files() {
        let mut store = SessionStore::new(8, 10);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.store_upload(a, file("a.csv", b"v\n1\n"));
        store.store_upload(b, file("b.csv", b"v\n2\n"));
        store.upload(a);
        store.store_upload(c, file("c.csv", b"v\n3\n"));

        assert!(store.upload(b).is_none());
        assert!(store.upload(a).is_some());
        assert!(store.upload(c).is_some());
        assert_eq!(store.upload_bytes(), 8);
        assert_eq!(store.len(), 3);

        // Replacing a file counts only the new one.
        store.store_upload(c, file("c.csv", b"v\n33\n"));
        assert_eq!(store.upload_bytes(), 9);
        store.clear_upload(a);
        assert_eq!(store.upload_bytes(), 5);
    }

    #[test]
    fn upload_can_be_cleared() {
        let mut store = SessionStore::new(4, usize::MAX);
        let id = Uuid::new_v4();
        store.store_upload(id, file("data.csv", b"v\n1\n"));
        assert_eq!(store.upload(id).map(|u| u.info().size), Some(4));
        store.clear_upload(id);
        assert!(store.upload(id).is_none());
        assert_eq!(store.upload_bytes(), 0);
    }

    #[test]
    fn session_is_read_from_cookie_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={id}")).unwrap(),
        );
        let session = Session::from_headers(&headers);
        assert_eq!(session, Session { id, fresh: false });

        let fresh = Session::from_headers(&HeaderMap::new());
        assert!(fresh.fresh);
        assert!(fresh.cookie().starts_with("dashboard_session="));
    }

    #[test]
    fn fresh_session_sets_cookie() {
        let fresh = Session::from_headers(&HeaderMap::new());
        let response = fresh.respond("ok");
        assert!(response.headers().get(header::SET_COOKIE).is_some());

        let known = Session {
            id: fresh.id,
            fresh: false,
        };
        assert!(known.respond("ok").headers().get(header::SET_COOKIE).is_none());
    }
}
