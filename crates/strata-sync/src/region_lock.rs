use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::cmp::Ordering;
use strata_geom::Aabb;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Shared,
    Exclusive,
}

#[derive(Clone, Debug)]
struct Claim {
    id: u64,
    region: Aabb,
    access: Access,
}

impl Claim {
    fn conflicts(&self, region: &Aabb, access: Access) -> bool {
        if self.access == Access::Shared && access == Access::Shared {
            return false;
        }
        self.region.intersects(region)
    }
}

/// Canonical acquisition order: min corner z, y, x, then max corner z, y, x.
#[derive(Clone, Copy, Debug)]
struct ClaimKey([f32; 6]);

impl ClaimKey {
    fn of(region: &Aabb) -> Self {
        let (lo, hi) = (region.min(), region.max());
        ClaimKey([lo.z, lo.y, lo.x, hi.z, hi.y, hi.x])
    }

    fn cmp(&self, other: &ClaimKey) -> Ordering {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.total_cmp(b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

thread_local! {
    // (arbitrator address, claim id, key) for claims held by this thread.
    static HELD: RefCell<Vec<(usize, u64, ClaimKey)>> = const { RefCell::new(Vec::new()) };
}

#[derive(Default)]
struct ArbiterState {
    claims: Vec<Claim>,
    next_id: u64,
}

/// Admits concurrent access to arbitrary axis-aligned regions.
///
/// Claims on overlapping regions serialize unless both are [`Access::Shared`];
/// everything else proceeds in parallel. Waiters block on a condition variable and
/// re-check on every release.
///
/// A thread holding several claims at once must take them in canonical order
/// (see [`RegionArbitrator::lock_all`]); debug builds assert this.
#[derive(Default)]
pub struct RegionArbitrator {
    state: Mutex<ArbiterState>,
    released: Condvar,
}

impl RegionArbitrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    fn check_order(&self, key: &ClaimKey) {
        if cfg!(debug_assertions) {
            let me = self.addr();
            HELD.with(|held| {
                for (arb, _, k) in held.borrow().iter() {
                    debug_assert!(
                        *arb != me || k.cmp(key) == Ordering::Less,
                        "region claim {key:?} taken out of canonical order after {k:?}"
                    );
                }
            });
        }
    }

    fn admit(&self, state: &mut ArbiterState, region: Aabb, access: Access) -> RegionGuard<'_> {
        let id = state.next_id;
        state.next_id += 1;
        state.claims.push(Claim { id, region, access });
        let key = ClaimKey::of(&region);
        HELD.with(|held| held.borrow_mut().push((self.addr(), id, key)));
        RegionGuard {
            arbiter: self,
            id,
            region,
            access,
        }
    }

    /// Blocks until `region` can be claimed with `access`.
    pub fn lock(&self, region: Aabb, access: Access) -> RegionGuard<'_> {
        self.check_order(&ClaimKey::of(&region));
        let mut state = self.state.lock();
        let mut waited = false;
        while state.claims.iter().any(|c| c.conflicts(&region, access)) {
            if !waited {
                log::trace!(target: "regions", "waiting for {access:?} claim on {region:?}");
                waited = true;
            }
            self.released.wait(&mut state);
        }
        self.admit(&mut state, region, access)
    }

    pub fn try_lock(&self, region: Aabb, access: Access) -> Option<RegionGuard<'_>> {
        self.check_order(&ClaimKey::of(&region));
        let mut state = self.state.lock();
        if state.claims.iter().any(|c| c.conflicts(&region, access)) {
            return None;
        }
        Some(self.admit(&mut state, region, access))
    }

    /// Claims several regions, acquiring them in canonical order.
    ///
    /// The regions must not conflict with each other.
    pub fn lock_all(&self, regions: &[Aabb], access: Access) -> Vec<RegionGuard<'_>> {
        let mut sorted: Vec<Aabb> = regions.to_vec();
        sorted.sort_by(|a, b| ClaimKey::of(a).cmp(&ClaimKey::of(b)));
        debug_assert!(
            access == Access::Shared
                || sorted
                    .iter()
                    .enumerate()
                    .all(|(i, a)| sorted[i + 1..].iter().all(|b| !a.intersects(b))),
            "lock_all called with overlapping exclusive regions"
        );
        sorted.into_iter().map(|r| self.lock(r, access)).collect()
    }

    pub fn active_claims(&self) -> Vec<(Aabb, Access)> {
        self.state
            .lock()
            .claims
            .iter()
            .map(|c| (c.region, c.access))
            .collect()
    }

    fn unlock(&self, id: u64) {
        {
            let mut state = self.state.lock();
            state.claims.retain(|c| c.id != id);
        }
        let me = self.addr();
        HELD.with(|held| held.borrow_mut().retain(|(arb, h, _)| !(*arb == me && *h == id)));
        self.released.notify_all();
    }
}

/// Active claim; released on drop.
pub struct RegionGuard<'a> {
    arbiter: &'a RegionArbitrator,
    id: u64,
    region: Aabb,
    access: Access,
}

impl RegionGuard<'_> {
    pub fn region(&self) -> &Aabb {
        &self.region
    }

    pub fn access(&self) -> Access {
        self.access
    }
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        self.arbiter.unlock(self.id);
    }
}

impl std::fmt::Debug for RegionGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionGuard")
            .field("region", &self.region)
            .field("access", &self.access)
            .finish()
    }
}
