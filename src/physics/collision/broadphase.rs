//! Broad phase collision detection algorithms
//! are responsible for detecting pairs of possibly intersecting objects
//! for further, more accurate narrow phase inspection.

use super::{ray_aabb, Ray, AABB};
use crate::{math as m, physics::FixtureKey};

use std::collections::BTreeMap;
use thunderdome as td;

/// Key of a proxy stored in a broad phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProxyKey(td::Index);

impl PartialOrd for ProxyKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProxyKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.to_bits().cmp(&other.0.to_bits())
    }
}

/// The thing a broad phase proxy stands for: one child of a fixture's shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProxyOwner {
    pub fixture: FixtureKey,
    pub child: usize,
}

/// Changes in overlapping pairs since the last call to [`BroadPhase::update_pairs`].
#[derive(Clone, Debug, Default)]
pub struct PairUpdate {
    pub added: Vec<(ProxyOwner, ProxyOwner)>,
    pub removed: Vec<(ProxyOwner, ProxyOwner)>,
}

/// A broad phase algorithm.
///
/// Every proxy has a fat bounding box that is larger than the shape it stands for,
/// so that small motions don't require any work.
/// Pairs are reported once when their fat boxes start overlapping
/// and once more when they stop or either proxy is destroyed.
pub trait BroadPhase: Send + Sync {
    /// Insert a proxy with the tight bounding box of its shape.
    fn create_proxy(&mut self, aabb: AABB, owner: ProxyOwner) -> ProxyKey;
    /// Remove a proxy. Its pairs are reported as removed at the next update.
    fn destroy_proxy(&mut self, key: ProxyKey);
    /// Update a proxy with a new tight bounding box and the displacement of its body
    /// since the last step. Returns true if the fat box had to be recomputed.
    fn move_proxy(&mut self, key: ProxyKey, aabb: AABB, displacement: m::Vec2) -> bool;
    /// Find pairs that started or stopped overlapping.
    fn update_pairs(&mut self) -> PairUpdate;
    /// Find every proxy whose fat box overlaps the given region.
    fn query_aabb(&self, aabb: &AABB) -> Vec<ProxyOwner>;
    /// Find every proxy whose fat box the ray passes through within `t` in `[0, 1]`,
    /// along with the `t` at which it enters the box.
    fn ray_cast(&self, ray: &Ray) -> Vec<(ProxyOwner, f64)>;
    fn fat_aabb(&self, key: ProxyKey) -> Option<AABB>;
    fn proxy_count(&self) -> usize;
}

/// Parameters controlling the size of fat bounding boxes.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct FatAabbParams {
    /// Distance added on every side of the tight box.
    pub margin: f64,
    /// How many steps' worth of displacement to extend the box by in the direction of motion.
    pub multiplier: f64,
}

impl Default for FatAabbParams {
    fn default() -> Self {
        Self {
            margin: 0.1,
            multiplier: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Proxy {
    fat: AABB,
    owner: ProxyOwner,
}

type PairKey = (ProxyKey, ProxyKey);

#[inline]
fn pair_key(a: ProxyKey, b: ProxyKey) -> PairKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Storage and pair bookkeeping shared by the broad phase implementations.
#[derive(Default)]
struct ProxyStore {
    params: FatAabbParams,
    proxies: td::Arena<Proxy>,
    // BTreeMap so pairs come out in a deterministic order
    pairs: BTreeMap<PairKey, (ProxyOwner, ProxyOwner)>,
    orphaned_pairs: Vec<(ProxyOwner, ProxyOwner)>,
}

impl ProxyStore {
    fn new(params: FatAabbParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    fn create(&mut self, aabb: AABB, owner: ProxyOwner) -> ProxyKey {
        ProxyKey(self.proxies.insert(Proxy {
            fat: aabb.padded(self.params.margin),
            owner,
        }))
    }

    fn destroy(&mut self, key: ProxyKey) -> bool {
        if self.proxies.remove(key.0).is_none() {
            return false;
        }
        let orphaned = &mut self.orphaned_pairs;
        self.pairs.retain(|(a, b), owners| {
            let keep = *a != key && *b != key;
            if !keep {
                orphaned.push(*owners);
            }
            keep
        });
        true
    }

    fn update(&mut self, key: ProxyKey, aabb: AABB, displacement: m::Vec2) -> bool {
        let Some(proxy) = self.proxies.get_mut(key.0) else {
            return false;
        };
        if proxy.fat.contains(&aabb) {
            return false;
        }
        proxy.fat = aabb
            .padded(self.params.margin)
            .swept(self.params.multiplier * displacement);
        true
    }

    fn owners(&self, a: ProxyKey, b: ProxyKey) -> (ProxyOwner, ProxyOwner) {
        (self.proxies[a.0].owner, self.proxies[b.0].owner)
    }

    /// Compare the currently overlapping pairs against the previous set.
    fn diff(&mut self, current: Vec<PairKey>) -> PairUpdate {
        let current: BTreeMap<PairKey, (ProxyOwner, ProxyOwner)> = current
            .into_iter()
            .map(|(a, b)| {
                let key = pair_key(a, b);
                (key, self.owners(key.0, key.1))
            })
            .collect();

        let mut update = PairUpdate {
            added: Vec::new(),
            removed: std::mem::take(&mut self.orphaned_pairs),
        };
        for (key, owners) in &self.pairs {
            if !current.contains_key(key) {
                update.removed.push(*owners);
            }
        }
        for (key, owners) in &current {
            if !self.pairs.contains_key(key) {
                update.added.push(*owners);
            }
        }
        self.pairs = current;
        update
    }

    fn query_aabb(&self, aabb: &AABB) -> Vec<ProxyOwner> {
        self.proxies
            .iter()
            .filter(|(_, p)| p.fat.overlaps(aabb))
            .map(|(_, p)| p.owner)
            .collect()
    }

    fn ray_cast(&self, ray: &Ray) -> Vec<(ProxyOwner, f64)> {
        self.proxies
            .iter()
            .filter_map(|(_, p)| {
                ray_aabb(*ray, p.fat)
                    .filter(|t| *t <= 1.0)
                    .map(|t| (p.owner, t))
            })
            .collect()
    }
}

//
// Sweep and prune
//

/// Sweep and prune along the x axis.
///
/// Proxies are kept sorted by the left edge of their fat boxes.
/// Since things move only a little per step, the order changes little
/// and insertion sort brings it back up to date in close to linear time.
pub struct SweepAndPrune {
    store: ProxyStore,
    sorted: Vec<ProxyKey>,
}

impl Default for SweepAndPrune {
    fn default() -> Self {
        Self::new(FatAabbParams::default())
    }
}

impl SweepAndPrune {
    pub fn new(params: FatAabbParams) -> Self {
        Self {
            store: ProxyStore::new(params),
            sorted: Vec::new(),
        }
    }

    fn sort(&mut self) {
        let proxies = &self.store.proxies;
        let min_x = |k: &ProxyKey| proxies[k.0].fat.min.x;
        for i in 1..self.sorted.len() {
            let mut j = i;
            while j > 0 && min_x(&self.sorted[j - 1]) > min_x(&self.sorted[j]) {
                self.sorted.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

impl BroadPhase for SweepAndPrune {
    fn create_proxy(&mut self, aabb: AABB, owner: ProxyOwner) -> ProxyKey {
        let key = self.store.create(aabb, owner);
        self.sorted.push(key);
        key
    }

    fn destroy_proxy(&mut self, key: ProxyKey) {
        if self.store.destroy(key) {
            self.sorted.retain(|k| *k != key);
        }
    }

    fn move_proxy(&mut self, key: ProxyKey, aabb: AABB, displacement: m::Vec2) -> bool {
        self.store.update(key, aabb, displacement)
    }

    fn update_pairs(&mut self) -> PairUpdate {
        self.sort();

        let proxies = &self.store.proxies;
        let mut current = Vec::new();
        for (i, key_a) in self.sorted.iter().enumerate() {
            let fat_a = proxies[key_a.0].fat;
            for key_b in &self.sorted[i + 1..] {
                let fat_b = proxies[key_b.0].fat;
                if fat_b.min.x > fat_a.max.x {
                    break;
                }
                if fat_a.min.y <= fat_b.max.y && fat_b.min.y <= fat_a.max.y {
                    current.push((*key_a, *key_b));
                }
            }
        }
        self.store.diff(current)
    }

    fn query_aabb(&self, aabb: &AABB) -> Vec<ProxyOwner> {
        let proxies = &self.store.proxies;
        self.sorted
            .iter()
            .map(|k| &proxies[k.0])
            .take_while(|p| p.fat.min.x <= aabb.max.x)
            .filter(|p| p.fat.overlaps(aabb))
            .map(|p| p.owner)
            .collect()
    }

    fn ray_cast(&self, ray: &Ray) -> Vec<(ProxyOwner, f64)> {
        self.store.ray_cast(ray)
    }

    fn fat_aabb(&self, key: ProxyKey) -> Option<AABB> {
        self.store.proxies.get(key.0).map(|p| p.fat)
    }

    fn proxy_count(&self) -> usize {
        self.store.proxies.len()
    }
}

//
// Brute force
//

/// The simplest possible broad phase algorithm,
/// which checks every proxy against every other proxy.
/// Very inefficient, but can work for small systems.
#[derive(Default)]
pub struct BruteForce {
    store: ProxyStore,
}

impl BruteForce {
    pub fn new(params: FatAabbParams) -> Self {
        Self {
            store: ProxyStore::new(params),
        }
    }
}

impl BroadPhase for BruteForce {
    fn create_proxy(&mut self, aabb: AABB, owner: ProxyOwner) -> ProxyKey {
        self.store.create(aabb, owner)
    }

    fn destroy_proxy(&mut self, key: ProxyKey) {
        self.store.destroy(key);
    }

    fn move_proxy(&mut self, key: ProxyKey, aabb: AABB, displacement: m::Vec2) -> bool {
        self.store.update(key, aabb, displacement)
    }

    fn update_pairs(&mut self) -> PairUpdate {
        let items: Vec<(ProxyKey, AABB)> = self
            .store
            .proxies
            .iter()
            .map(|(k, p)| (ProxyKey(k), p.fat))
            .collect();
        let mut current = Vec::new();
        for (i, (key_a, fat_a)) in items.iter().enumerate() {
            for (key_b, fat_b) in &items[i + 1..] {
                if fat_a.overlaps(fat_b) {
                    current.push((*key_a, *key_b));
                }
            }
        }
        self.store.diff(current)
    }

    fn query_aabb(&self, aabb: &AABB) -> Vec<ProxyOwner> {
        self.store.query_aabb(aabb)
    }

    fn ray_cast(&self, ray: &Ray) -> Vec<(ProxyOwner, f64)> {
        self.store.ray_cast(ray)
    }

    fn fat_aabb(&self, key: ProxyKey) -> Option<AABB> {
        self.store.proxies.get(key.0).map(|p| p.fat)
    }

    fn proxy_count(&self) -> usize {
        self.store.proxies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn owners(n: usize) -> Vec<ProxyOwner> {
        let mut arena = td::Arena::new();
        (0..n)
            .map(|_| ProxyOwner {
                fixture: FixtureKey(arena.insert(())),
                child: 0,
            })
            .collect()
    }

    fn unit_box_at(x: f64, y: f64) -> AABB {
        AABB::new(m::Vec2::new(x - 0.5, y - 0.5), m::Vec2::new(x + 0.5, y + 0.5))
    }

    fn pair_lifecycle(bp: &mut dyn BroadPhase) {
        let o = owners(2);
        let a = bp.create_proxy(unit_box_at(0.0, 0.0), o[0]);
        let b = bp.create_proxy(unit_box_at(5.0, 0.0), o[1]);
        assert!(bp.update_pairs().added.is_empty());

        // small motion stays inside the fat box
        assert!(!bp.move_proxy(a, unit_box_at(0.05, 0.0), m::Vec2::new(0.05, 0.0)));

        assert!(bp.move_proxy(b, unit_box_at(0.9, 0.0), m::Vec2::new(-4.1, 0.0)));
        let update = bp.update_pairs();
        assert_eq!(update.added, vec![(o[0], o[1])]);
        assert!(update.removed.is_empty());
        // reported only once
        let update = bp.update_pairs();
        assert!(update.added.is_empty() && update.removed.is_empty());

        bp.move_proxy(b, unit_box_at(9.0, 0.0), m::Vec2::new(8.1, 0.0));
        let update = bp.update_pairs();
        assert_eq!(update.removed, vec![(o[0], o[1])]);

        bp.move_proxy(b, unit_box_at(0.5, 0.0), m::Vec2::new(-8.5, 0.0));
        assert_eq!(bp.update_pairs().added.len(), 1);
        bp.destroy_proxy(a);
        let update = bp.update_pairs();
        assert_eq!(update.removed, vec![(o[0], o[1])]);
        assert_eq!(bp.proxy_count(), 1);
    }

    #[test]
    fn sweep_and_prune_pair_lifecycle() {
        pair_lifecycle(&mut SweepAndPrune::default());
    }

    #[test]
    fn brute_force_pair_lifecycle() {
        pair_lifecycle(&mut BruteForce::default());
    }

    #[test]
    fn fat_box_extends_along_motion() {
        let mut bp = SweepAndPrune::default();
        let key = bp.create_proxy(unit_box_at(0.0, 0.0), owners(1)[0]);
        bp.move_proxy(key, unit_box_at(1.0, 0.0), m::Vec2::new(1.0, 0.0));
        let fat = bp.fat_aabb(key).unwrap();
        assert!((fat.min.x - 0.4).abs() < 1e-12);
        assert!((fat.max.x - 3.6).abs() < 1e-12);
        assert!((fat.max.y - 0.6).abs() < 1e-12);
    }

    #[test]
    fn implementations_agree() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let mut sap = SweepAndPrune::default();
        let mut brute = BruteForce::default();
        let mut keys = Vec::new();
        for o in owners(60) {
            let aabb = unit_box_at(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
            keys.push((sap.create_proxy(aabb, o), brute.create_proxy(aabb, o)));
        }
        for _ in 0..5 {
            for (k_sap, k_brute) in &keys {
                let d = m::Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
                let center = sap.fat_aabb(*k_sap).unwrap().center() + d;
                let aabb = unit_box_at(center.x, center.y);
                sap.move_proxy(*k_sap, aabb, d);
                brute.move_proxy(*k_brute, aabb, d);
            }
            let mut from_sap = sap.update_pairs();
            let mut from_brute = brute.update_pairs();
            let norm = |pairs: &mut Vec<(ProxyOwner, ProxyOwner)>| {
                let mut bits: Vec<(u64, u64)> = pairs
                    .iter()
                    .map(|(a, b)| {
                        let (a, b) = (a.fixture.index().to_bits(), b.fixture.index().to_bits());
                        (a.min(b), a.max(b))
                    })
                    .collect();
                bits.sort_unstable();
                bits
            };
            assert_eq!(norm(&mut from_sap.added), norm(&mut from_brute.added));
            assert_eq!(norm(&mut from_sap.removed), norm(&mut from_brute.removed));
        }

        let region = AABB::new(m::Vec2::new(-3.0, -3.0), m::Vec2::new(3.0, 3.0));
        assert_eq!(sap.query_aabb(&region).len(), brute.query_aabb(&region).len());
    }
}
