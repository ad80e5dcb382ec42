//! Thread-safe in-process [`RefreshCache`] with fixed capacity and entry TTL.

// self
use crate::{
	_prelude::*,
	cache::{CacheFuture, RefreshCache},
	refresh::RefreshResult,
};

type CacheMap = Arc<Mutex<CacheState>>;

#[derive(Default)]
struct CacheState {
	entries: HashMap<String, CacheEntry>,
	clock: u64,
}

struct CacheEntry {
	result: RefreshResult,
	inserted_at: Instant,
	last_used: u64,
}

/// Process-local cache; each process in a multi-process deployment keeps its own.
///
/// Expired entries are never returned and are purged lazily on access. When the cache is
/// full, the least-recently-used live entry is displaced.
#[derive(Clone)]
pub struct MemoryRefreshCache {
	state: CacheMap,
	capacity: usize,
	ttl: StdDuration,
}
impl MemoryRefreshCache {
	/// Creates a cache holding at most `capacity` entries for `ttl` each.
	pub fn new(capacity: usize, ttl: StdDuration) -> Self {
		Self { state: Default::default(), capacity: capacity.max(1), ttl }
	}

	/// Number of stored entries, expired ones included until they are purged.
	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_at(map: &CacheMap, ttl: StdDuration, key: &str, now: Instant) -> Option<RefreshResult> {
		let mut guard = map.lock();
		let state = &mut *guard;
		let expired = match state.entries.get(key) {
			Some(entry) => now.saturating_duration_since(entry.inserted_at) >= ttl,
			None => return None,
		};

		if expired {
			state.entries.remove(key);

			return None;
		}

		state.clock += 1;

		let clock = state.clock;

		state.entries.get_mut(key).map(|entry| {
			entry.last_used = clock;

			entry.result.clone()
		})
	}

	fn insert_at(
		map: &CacheMap,
		capacity: usize,
		ttl: StdDuration,
		key: String,
		result: RefreshResult,
		now: Instant,
	) {
		let mut guard = map.lock();
		let state = &mut *guard;

		state.clock += 1;

		if !state.entries.contains_key(&key) && state.entries.len() >= capacity {
			state.entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);

			if state.entries.len() >= capacity {
				let victim = state
					.entries
					.iter()
					.min_by_key(|(_, entry)| entry.last_used)
					.map(|(key, _)| key.clone());

				if let Some(victim) = victim {
					state.entries.remove(&victim);
				}
			}
		}

		let last_used = state.clock;

		state.entries.insert(key, CacheEntry { result, inserted_at: now, last_used });
	}
}
impl RefreshCache for MemoryRefreshCache {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<RefreshResult>> {
		let map = self.state.clone();
		let ttl = self.ttl;

		Box::pin(async move { Ok(Self::get_at(&map, ttl, key, Instant::now())) })
	}

	fn insert(&self, key: String, result: RefreshResult) -> CacheFuture<'_, ()> {
		let map = self.state.clone();
		let (capacity, ttl) = (self.capacity, self.ttl);

		Box::pin(async move {
			Self::insert_at(&map, capacity, ttl, key, result, Instant::now());

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		let map = self.state.clone();

		Box::pin(async move {
			map.lock().entries.remove(key);

			Ok(())
		})
	}
}
impl Debug for MemoryRefreshCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryRefreshCache")
			.field("len", &self.len())
			.field("capacity", &self.capacity)
			.field("ttl", &self.ttl)
			.finish()
	}
}
