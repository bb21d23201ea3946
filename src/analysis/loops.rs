//! Natural-loop detection and the loop-nested topological order.
//!
//! A natural loop is identified by a back edge `u → h` where the header `h`
//! dominates `u`; its body is everything that can reach the back edge
//! without passing through the header. Loops sharing a header are merged.
//!
//! The topological order computed here keeps every loop's blocks in one
//! contiguous interval, with the header first. The loop-repeating traversal
//! (see [`crate::analysis::traversal`]) uses the interval bounds to restart
//! just the loop whose facts changed instead of the whole method.
//!
//! Irreducible regions (a retreating edge whose target does not dominate its
//! source) get no interval; the order falls back to emitting the remaining
//! blocks by reverse-postorder position, which keeps the driver correct -
//! merely without the localized-restart optimization for those regions.

use std::collections::{HashMap, HashSet};

use fixedbitset::FixedBitSet;

use crate::{
    mir::{BlockId, MirMethod},
    Result,
};

/// One natural loop.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    /// The single entry block of the loop.
    pub header: BlockId,
    /// All blocks in the loop, header included.
    pub body: FixedBitSet,
    /// Sources of back edges into the header.
    pub back_edges: Vec<BlockId>,
    /// Nesting depth; 0 for outermost loops.
    pub depth: usize,
}

impl NaturalLoop {
    /// Returns `true` if the loop body contains `block`.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(block.index())
    }

    /// Returns the number of blocks in the body.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.count_ones(..)
    }
}

/// Finds all natural loops. Requires dominators.
pub fn find_loops(method: &MirMethod) -> Result<Vec<NaturalLoop>> {
    let block_count = method.block_count();
    // Back edges grouped by header.
    let mut by_header: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for block in method.blocks().filter(|b| !b.is_hidden()) {
        for succ in block.successors() {
            if super::dominators::dominates(method, succ, block.id()) {
                by_header.entry(succ).or_default().push(block.id());
            }
        }
    }

    let mut loops: Vec<NaturalLoop> = Vec::with_capacity(by_header.len());
    for (header, back_edges) in by_header {
        let mut body = FixedBitSet::with_capacity(block_count);
        body.insert(header.index());
        let mut work: Vec<BlockId> = back_edges.clone();
        while let Some(block) = work.pop() {
            if body.contains(block.index()) {
                continue;
            }
            body.insert(block.index());
            if let Some(b) = method.block(block) {
                work.extend(b.predecessors().iter().copied());
            }
        }
        loops.push(NaturalLoop {
            header,
            body,
            back_edges,
            depth: 0,
        });
    }

    // Innermost-first ordering, then nesting depth by containment.
    loops.sort_by_key(|l| (l.size(), l.header.index()));
    for i in 0..loops.len() {
        let header = loops[i].header;
        loops[i].depth = loops
            .iter()
            .filter(|other| other.header != header && other.body.contains(header.index()))
            .count();
    }
    Ok(loops)
}

/// Topological order with contiguous loop intervals.
#[derive(Debug, Clone)]
pub struct TopologicalOrder {
    order: Vec<BlockId>,
    /// For positions holding a loop header: the exclusive end of the loop's
    /// interval.
    loop_ends: Vec<Option<usize>>,
}

impl TopologicalOrder {
    /// Returns the ordered block sequence.
    #[must_use]
    pub fn order(&self) -> &[BlockId] {
        &self.order
    }

    /// Returns the loop-interval end for the header emitted at `position`.
    #[must_use]
    pub fn loop_end(&self, position: usize) -> Option<usize> {
        self.loop_ends.get(position).copied().flatten()
    }

    /// Returns the number of ordered blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the order is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Entity scheduled at one nesting level: a plain block or a whole inner
/// loop compressed to a super-node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Entity {
    Block(BlockId),
    Loop(usize),
}

struct OrderBuilder<'m> {
    method: &'m MirMethod,
    loops: Vec<NaturalLoop>,
    /// Innermost loop per block-table index.
    innermost: Vec<Option<usize>>,
    /// Parent loop per loop index.
    parent: Vec<Option<usize>>,
    rpo_position: HashMap<BlockId, usize>,
    order: Vec<BlockId>,
    loop_ends: Vec<Option<usize>>,
}

impl<'m> OrderBuilder<'m> {
    fn new(method: &'m MirMethod) -> Result<Self> {
        let loops = find_loops(method)?;
        let block_count = method.block_count();

        // Loops are sorted smallest-first, so the first containing loop is
        // the innermost.
        let mut innermost: Vec<Option<usize>> = vec![None; block_count];
        for (i, l) in loops.iter().enumerate() {
            for bit in l.body.ones() {
                if innermost[bit].is_none() {
                    innermost[bit] = Some(i);
                }
            }
        }

        let mut parent: Vec<Option<usize>> = vec![None; loops.len()];
        for (i, l) in loops.iter().enumerate() {
            parent[i] = loops
                .iter()
                .enumerate()
                .find(|(j, other)| *j != i && other.body.contains(l.header.index()))
                .map(|(j, _)| j);
        }

        let rpo = method.dfs_order()?.reverse_postorder();
        let rpo_position: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        Ok(Self {
            method,
            loops,
            innermost,
            parent,
            rpo_position,
            order: Vec::with_capacity(block_count),
            loop_ends: Vec::with_capacity(block_count),
        })
    }

    /// Maps a block to its scheduling entity at the given scope, or `None`
    /// if the block is not a member of the scope.
    fn entity_at(&self, block: BlockId, scope: Option<usize>) -> Option<Entity> {
        let mut current = self.innermost[block.index()];
        if current == scope {
            return Some(Entity::Block(block));
        }
        while let Some(l) = current {
            let up = self.parent[l];
            if up == scope {
                return Some(Entity::Loop(l));
            }
            current = up;
        }
        None
    }

    fn emit_block(&mut self, block: BlockId) {
        self.order.push(block);
        self.loop_ends.push(None);
    }

    /// Emits all members of `scope` (the whole method for `None`), keeping
    /// inner loops contiguous.
    fn emit_scope(&mut self, scope: Option<usize>) {
        // The scope header leads its interval and is emitted by the caller.
        let header = scope.map(|l| self.loops[l].header);

        let member_blocks: Vec<BlockId> = self
            .method
            .blocks()
            .filter(|b| !b.is_hidden())
            .map(crate::mir::BasicBlock::id)
            .filter(|&b| Some(b) != header)
            .filter(|&b| self.entity_at(b, scope).is_some())
            .collect();

        let mut entities: HashSet<Entity> = HashSet::new();
        for &b in &member_blocks {
            if let Some(e) = self.entity_at(b, scope) {
                entities.insert(e);
            }
        }

        // Dependency edges among entities; back/retreating edges (target
        // dominates source) are ignored so cycles collapse.
        let mut indegree: HashMap<Entity, usize> = entities.iter().map(|&e| (e, 0)).collect();
        let mut successors: HashMap<Entity, Vec<Entity>> = HashMap::new();
        for &from in &member_blocks {
            let from_entity = match self.entity_at(from, scope) {
                Some(e) => e,
                None => continue,
            };
            let block = match self.method.block(from) {
                Some(b) => b,
                None => continue,
            };
            for to in block.successors() {
                if Some(to) == header {
                    continue;
                }
                let to_entity = match self.entity_at(to, scope) {
                    Some(e) => e,
                    None => continue,
                };
                if to_entity == from_entity {
                    continue;
                }
                if super::dominators::dominates(self.method, to, from) {
                    continue;
                }
                successors.entry(from_entity).or_default().push(to_entity);
                *indegree.entry(to_entity).or_insert(0) += 1;
            }
        }

        let mut remaining = entities;
        while !remaining.is_empty() {
            let ready = remaining
                .iter()
                .copied()
                .filter(|e| indegree.get(e).copied().unwrap_or(0) == 0)
                .min_by_key(|e| self.entity_rpo_position(*e));
            // An irreducible cycle leaves nothing ready; fall back to the
            // earliest remaining entity by reverse-postorder position.
            let next = ready.unwrap_or_else(|| {
                self.min_by_rpo(&remaining)
            });
            remaining.remove(&next);
            if let Some(succs) = successors.remove(&next) {
                for succ in succs {
                    if let Some(count) = indegree.get_mut(&succ) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            match next {
                Entity::Block(b) => self.emit_block(b),
                Entity::Loop(l) => self.emit_loop(l),
            }
        }
    }

    fn emit_loop(&mut self, l: usize) {
        let header = self.loops[l].header;
        let header_position = self.order.len();
        self.emit_block(header);
        self.emit_scope(Some(l));
        self.loop_ends[header_position] = Some(self.order.len());
    }

    fn entity_rpo_position(&self, entity: Entity) -> usize {
        let block = match entity {
            Entity::Block(b) => b,
            Entity::Loop(l) => self.loops[l].header,
        };
        self.rpo_position.get(&block).copied().unwrap_or(usize::MAX)
    }

    fn min_by_rpo(&self, remaining: &HashSet<Entity>) -> Entity {
        remaining
            .iter()
            .copied()
            .min_by_key(|e| self.entity_rpo_position(*e))
            .expect("remaining set is non-empty")
    }
}

/// Computes the loop-nested topological order and stores it on the method.
///
/// Requires the DFS ordering and dominators.
pub fn compute_topological_order(method: &mut MirMethod) -> Result<()> {
    let mut builder = OrderBuilder::new(method)?;
    builder.emit_scope(None);
    let topological = TopologicalOrder {
        order: builder.order,
        loop_ends: builder.loop_ends,
    };
    method.topological = Some(topological);
    Ok(())
}
