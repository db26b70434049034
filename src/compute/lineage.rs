//! Trait genealogy and the per-trajectory utility map.
//!
//! Traits form a DAG: seeds are roots, a combination has two parents and a
//! modification has one. Everything the complexity measures need (seed
//! lineage, identifier length, marker count) is cached on the node when it is
//! created, so no identifier strings are built or parsed during a run.

use std::collections::HashMap;

/// Marker rendered after a modified trait's label.
pub const MODIFICATION_MARKER: char = '\'';

/// Index of a trait within its [`TraitPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitId(u32);

impl TraitId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Set of seed symbols, one bit per symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SeedSet(u32);

impl SeedSet {
    /// Set holding a single symbol.
    #[inline]
    pub fn single(symbol: u8) -> Self {
        Self(1 << symbol)
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    #[inline]
    pub fn contains(self, symbol: u8) -> bool {
        self.0 & (1 << symbol) != 0
    }

    #[inline]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Symbols in ascending order.
    pub fn symbols(self) -> impl Iterator<Item = u8> {
        (0..32u8).filter(move |&s| self.contains(s))
    }
}

/// How a trait came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Seed symbol from the alphabet.
    Seed(u8),
    /// `first` followed by `second`.
    Combination(TraitId, TraitId),
    /// Modified variant of the parent.
    Modification(TraitId),
}

/// A trait node with its cached derived data.
#[derive(Debug, Clone)]
pub struct TraitNode {
    origin: Origin,
    lineage: SeedSet,
    length: usize,
    seed_count: usize,
    modifications: usize,
    first_seed: u8,
}

impl TraitNode {
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Seed symbols this trait descends from.
    pub fn lineage(&self) -> SeedSet {
        self.lineage
    }

    /// Identifier length, modification markers included.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Identifier length with modification markers stripped.
    pub fn seed_count(&self) -> usize {
        self.seed_count
    }

    /// Number of modification markers in the identifier.
    pub fn modifications(&self) -> usize {
        self.modifications
    }

    /// First symbol of the identifier.
    pub fn first_seed(&self) -> u8 {
        self.first_seed
    }

    pub fn is_seed(&self) -> bool {
        matches!(self.origin, Origin::Seed(_))
    }
}

/// Every trait created during one trajectory together with its utility.
///
/// Traits are interned by origin: applying the same operation to the same
/// parents yields the same id. Entries are never removed.
#[derive(Debug, Clone)]
pub struct TraitPool {
    nodes: Vec<TraitNode>,
    utilities: Vec<f64>,
    index: HashMap<Origin, TraitId>,
    alphabet_size: usize,
}

impl TraitPool {
    /// Create a pool holding one seed trait per utility, in symbol order.
    pub fn with_seeds(utilities: &[f64]) -> Self {
        let mut pool = Self {
            nodes: Vec::with_capacity(utilities.len()),
            utilities: Vec::with_capacity(utilities.len()),
            index: HashMap::new(),
            alphabet_size: utilities.len(),
        };
        for (symbol, &utility) in utilities.iter().enumerate() {
            let symbol = symbol as u8;
            pool.insert(
                TraitNode {
                    origin: Origin::Seed(symbol),
                    lineage: SeedSet::single(symbol),
                    length: 1,
                    seed_count: 1,
                    modifications: 0,
                    first_seed: symbol,
                },
                utility,
            );
        }
        pool
    }

    /// Number of seed symbols.
    #[inline]
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// Id of a seed symbol.
    #[inline]
    pub fn seed(&self, symbol: u8) -> TraitId {
        debug_assert!((symbol as usize) < self.alphabet_size);
        TraitId(symbol as u32)
    }

    /// Number of traits ever created.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn get(&self, id: TraitId) -> &TraitNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn utility(&self, id: TraitId) -> f64 {
        self.utilities[id.index()]
    }

    /// Overwrite a trait's utility.
    pub fn set_utility(&mut self, id: TraitId, utility: f64) {
        self.utilities[id.index()] = utility;
    }

    /// Existing trait with the given origin.
    pub fn find(&self, origin: &Origin) -> Option<TraitId> {
        self.index.get(origin).copied()
    }

    /// Combination of `first` and `second`, created with `utility` or, if it
    /// already exists, given `utility` as its new value.
    pub fn combine(&mut self, first: TraitId, second: TraitId, utility: f64) -> TraitId {
        let origin = Origin::Combination(first, second);
        if let Some(id) = self.find(&origin) {
            self.set_utility(id, utility);
            return id;
        }

        let (a, b) = (self.get(first), self.get(second));
        let node = TraitNode {
            origin,
            lineage: a.lineage.union(b.lineage),
            length: a.length + b.length,
            seed_count: a.seed_count + b.seed_count,
            modifications: a.modifications + b.modifications,
            first_seed: a.first_seed,
        };
        self.insert(node, utility)
    }

    /// Modified variant of `parent`; see [`TraitPool::combine`] for reuse.
    pub fn modify(&mut self, parent: TraitId, utility: f64) -> TraitId {
        let origin = Origin::Modification(parent);
        if let Some(id) = self.find(&origin) {
            self.set_utility(id, utility);
            return id;
        }

        let p = self.get(parent);
        let node = TraitNode {
            origin,
            lineage: p.lineage,
            length: p.length + 1,
            seed_count: p.seed_count,
            modifications: p.modifications + 1,
            first_seed: p.first_seed,
        };
        self.insert(node, utility)
    }

    fn insert(&mut self, node: TraitNode, utility: f64) -> TraitId {
        let id = TraitId(self.nodes.len() as u32);
        self.index.insert(node.origin, id);
        self.nodes.push(node);
        self.utilities.push(utility);
        id
    }

    /// Textual identifier: seeds are `a`, `b`, ..., combinations concatenate
    /// and every modification appends [`MODIFICATION_MARKER`].
    pub fn label(&self, id: TraitId) -> String {
        enum Item {
            Node(TraitId),
            Marker,
        }

        let mut label = String::with_capacity(self.get(id).length);
        let mut stack = vec![Item::Node(id)];
        while let Some(item) = stack.pop() {
            match item {
                Item::Marker => label.push(MODIFICATION_MARKER),
                Item::Node(id) => match self.get(id).origin {
                    Origin::Seed(symbol) => label.push(seed_symbol(symbol)),
                    Origin::Combination(first, second) => {
                        stack.push(Item::Node(second));
                        stack.push(Item::Node(first));
                    }
                    Origin::Modification(parent) => {
                        stack.push(Item::Marker);
                        stack.push(Item::Node(parent));
                    }
                },
            }
        }
        label
    }
}

/// Letter for a seed symbol.
#[inline]
pub fn seed_symbol(symbol: u8) -> char {
    (b'a' + symbol) as char
}
