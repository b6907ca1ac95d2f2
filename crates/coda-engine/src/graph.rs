//! Audio graph for node-based processing
//!
//! Nodes and directed connections, scheduled with Kahn's algorithm
//! (in-degree-zero first, ties broken by insertion order) and cached
//! until the topology changes. Edits are validated on the control
//! thread; an edit that would create a cycle or reference a missing
//! node is rejected before the graph ever reaches the audio thread.

use std::collections::HashMap;

use log::warn;
use smallvec::SmallVec;
use thiserror::Error;

use coda_core::Sample;

use crate::dsp_nodes::DelayNode;
use crate::node::{AudioNode, NodeId};

/// Maximum channels per node for pre-allocated scratch
pub const MAX_NODE_CHANNELS: usize = 8;

/// Directed edge between two node channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from_node: NodeId,
    pub from_channel: usize,
    pub to_node: NodeId,
    pub to_channel: usize,
}

/// Rejected graph edits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("channel {channel} out of range for node {node:?}")]
    ChannelOutOfRange { node: NodeId, channel: usize },

    #[error("connection already exists")]
    DuplicateConnection,

    #[error("node cannot connect to itself")]
    SelfConnection,

    #[error("connection would create a cycle")]
    WouldCreateCycle,

    #[error("graph failed validation")]
    Invalid,
}

struct NodeSlot {
    id: NodeId,
    node: Box<dyn AudioNode>,
    /// Output buffers, one per channel
    buffers: Vec<Vec<Sample>>,
}

/// Audio processing graph
pub struct AudioGraph {
    /// Insertion order is load-bearing: it breaks scheduling ties
    nodes: Vec<NodeSlot>,
    index: HashMap<NodeId, usize>,
    connections: Vec<Connection>,
    processing_order: Vec<usize>,
    input_scratch: Vec<Vec<Sample>>,
    output_scratch: Vec<Vec<Sample>>,
    block_size: usize,
    next_id: u32,
    needs_reorder: bool,
}

impl AudioGraph {
    pub fn new(block_size: usize) -> Self {
        let scratch = || (0..MAX_NODE_CHANNELS).map(|_| vec![0.0; block_size]).collect();
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            connections: Vec::new(),
            processing_order: Vec::new(),
            input_scratch: scratch(),
            output_scratch: scratch(),
            block_size,
            next_id: 0,
            needs_reorder: true,
        }
    }

    /// Add a node, allocating its output buffers
    pub fn add_node(&mut self, node: Box<dyn AudioNode>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let buffers = (0..node.num_outputs().min(MAX_NODE_CHANNELS))
            .map(|_| vec![0.0; self.block_size])
            .collect();

        self.index.insert(id, self.nodes.len());
        self.nodes.push(NodeSlot { id, node, buffers });
        self.needs_reorder = true;
        id
    }

    /// Remove a node and every connection touching it
    pub fn remove_node(&mut self, id: NodeId) -> Option<Box<dyn AudioNode>> {
        let idx = self.index.remove(&id)?;
        self.connections
            .retain(|c| c.from_node != id && c.to_node != id);

        let slot = self.nodes.remove(idx);
        for (i, slot) in self.nodes.iter().enumerate() {
            self.index.insert(slot.id, i);
        }
        self.needs_reorder = true;
        Some(slot.node)
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn AudioNode> {
        self.index.get(&id).map(|&i| self.nodes[i].node.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Box<dyn AudioNode>> {
        self.index.get(&id).map(|&i| &mut self.nodes[i].node)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Connect two node channels. The edit is validated here, on the
    /// control thread: unknown endpoints, out-of-range channels,
    /// duplicates, self-loops and cycles are all rejected.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_channel: usize,
        to_node: NodeId,
        to_channel: usize,
    ) -> Result<(), GraphError> {
        if from_node == to_node {
            return Err(GraphError::SelfConnection);
        }

        let from = self
            .index
            .get(&from_node)
            .ok_or(GraphError::UnknownNode(from_node))?;
        let to = self
            .index
            .get(&to_node)
            .ok_or(GraphError::UnknownNode(to_node))?;

        if from_channel >= self.nodes[*from].node.num_outputs() {
            return Err(GraphError::ChannelOutOfRange {
                node: from_node,
                channel: from_channel,
            });
        }
        if to_channel >= self.nodes[*to].node.num_inputs() {
            return Err(GraphError::ChannelOutOfRange {
                node: to_node,
                channel: to_channel,
            });
        }

        let connection = Connection {
            from_node,
            from_channel,
            to_node,
            to_channel,
        };
        if self.connections.contains(&connection) {
            return Err(GraphError::DuplicateConnection);
        }

        self.connections.push(connection);
        if self.has_cycles() {
            self.connections.pop();
            warn!("rejected graph edit: {from_node:?} -> {to_node:?} would create a cycle");
            return Err(GraphError::WouldCreateCycle);
        }

        self.needs_reorder = true;
        Ok(())
    }

    /// Remove all connections between two nodes
    pub fn disconnect(&mut self, from_node: NodeId, to_node: NodeId) {
        self.connections
            .retain(|c| c.from_node != from_node || c.to_node != to_node);
        self.needs_reorder = true;
    }

    /// DFS cycle detection with a recursion-stack set
    pub fn has_cycles(&self) -> bool {
        let n = self.nodes.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];

        for start in 0..n {
            if !visited[start] && self.cycle_dfs(start, &mut visited, &mut on_stack) {
                return true;
            }
        }
        false
    }

    fn cycle_dfs(&self, idx: usize, visited: &mut [bool], on_stack: &mut [bool]) -> bool {
        visited[idx] = true;
        on_stack[idx] = true;

        let id = self.nodes[idx].id;
        for conn in &self.connections {
            if conn.from_node != id {
                continue;
            }
            let Some(&next) = self.index.get(&conn.to_node) else {
                continue;
            };
            if on_stack[next] {
                return true;
            }
            if !visited[next] && self.cycle_dfs(next, visited, on_stack) {
                return true;
            }
        }

        on_stack[idx] = false;
        false
    }

    /// A valid graph is acyclic with every connection endpoint present
    pub fn is_valid(&self) -> bool {
        if self.has_cycles() {
            return false;
        }
        self.connections
            .iter()
            .all(|c| self.index.contains_key(&c.from_node) && self.index.contains_key(&c.to_node))
    }

    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.has_cycles() {
            errors.push("graph contains a cycle".to_string());
        }
        for conn in &self.connections {
            if !self.index.contains_key(&conn.from_node) {
                errors.push(format!("connection references missing node {:?}", conn.from_node));
            }
            if !self.index.contains_key(&conn.to_node) {
                errors.push(format!("connection references missing node {:?}", conn.to_node));
            }
        }
        errors
    }

    /// Kahn's algorithm; ties broken by node insertion order
    fn update_processing_order(&mut self) {
        if !self.needs_reorder {
            return;
        }

        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for conn in &self.connections {
            if let Some(&to) = self.index.get(&conn.to_node) {
                in_degree[to] += 1;
            }
        }

        // `ready` stays sorted by insertion index: sources are seeded in
        // order, and later insertions keep the ascending scan stable via
        // sorted insert.
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut cursor = 0;

        while cursor < ready.len() {
            let idx = ready[cursor];
            cursor += 1;
            order.push(idx);

            let id = self.nodes[idx].id;
            for conn in &self.connections {
                if conn.from_node != id {
                    continue;
                }
                let Some(&to) = self.index.get(&conn.to_node) else {
                    continue;
                };
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    let insert_at = ready[cursor..]
                        .iter()
                        .position(|&r| r > to)
                        .map(|p| cursor + p)
                        .unwrap_or(ready.len());
                    ready.insert(insert_at, to);
                }
            }
        }

        self.processing_order = order;
        self.needs_reorder = false;
    }

    /// Current processing order as node ids (recomputed if stale)
    pub fn processing_order(&mut self) -> Vec<NodeId> {
        self.update_processing_order();
        self.processing_order
            .iter()
            .map(|&i| self.nodes[i].id)
            .collect()
    }

    /// Process one block through the graph.
    ///
    /// `io` carries the external input in its first channels and receives
    /// the output node's result. `input_node` gets `io` injected as its
    /// input; `output_node`'s buffers are copied back out. Must only be
    /// called on a graph that validated clean; a cyclic remainder is
    /// simply never scheduled.
    pub fn process_block(
        &mut self,
        io: &mut [&mut [Sample]],
        input_node: NodeId,
        output_node: NodeId,
        position: u64,
    ) {
        self.update_processing_order();

        let num_samples = io.first().map(|c| c.len()).unwrap_or(0).min(self.block_size);
        if num_samples == 0 {
            return;
        }

        for step in 0..self.processing_order.len() {
            let idx = self.processing_order[step];
            let id = self.nodes[idx].id;
            let num_inputs = self.nodes[idx].node.num_inputs().min(MAX_NODE_CHANNELS);
            let num_outputs = self.nodes[idx].node.num_outputs().min(MAX_NODE_CHANNELS);

            // Gather inputs: external injection for the input node,
            // summed upstream buffers for everyone else
            for ch in 0..num_inputs {
                let scratch = &mut self.input_scratch[ch];
                scratch[..num_samples].fill(0.0);

                if id == input_node {
                    if let Some(external) = io.get(ch) {
                        let n = num_samples.min(external.len());
                        scratch[..n].copy_from_slice(&external[..n]);
                    }
                }
            }
            if id != input_node {
                for conn in &self.connections {
                    if conn.to_node != id || conn.to_channel >= num_inputs {
                        continue;
                    }
                    let Some(&from) = self.index.get(&conn.from_node) else {
                        continue;
                    };
                    let Some(from_buf) = self.nodes[from].buffers.get(conn.from_channel) else {
                        continue;
                    };
                    let scratch = &mut self.input_scratch[conn.to_channel];
                    for i in 0..num_samples {
                        scratch[i] += from_buf[i];
                    }
                }
            }

            for ch in 0..num_outputs {
                self.output_scratch[ch][..num_samples].fill(0.0);
            }

            let slot = &mut self.nodes[idx];
            if slot.node.is_bypassed() {
                for ch in 0..num_inputs.min(num_outputs) {
                    let (input, output) = (&self.input_scratch[ch], &mut self.output_scratch[ch]);
                    output[..num_samples].copy_from_slice(&input[..num_samples]);
                }
            } else {
                let inputs: SmallVec<[&[Sample]; MAX_NODE_CHANNELS]> = self.input_scratch
                    [..num_inputs]
                    .iter()
                    .map(|b| &b[..num_samples])
                    .collect();
                let mut outputs: SmallVec<[&mut [Sample]; MAX_NODE_CHANNELS]> = self.output_scratch
                    [..num_outputs]
                    .iter_mut()
                    .map(|b| &mut b[..num_samples])
                    .collect();
                slot.node.process(&inputs, &mut outputs, position);
            }

            for ch in 0..num_outputs.min(slot.buffers.len()) {
                slot.buffers[ch][..num_samples].copy_from_slice(&self.output_scratch[ch][..num_samples]);
            }
        }

        // Copy the output node's buffers to the destination; a missing
        // output node is a no-op and leaves the destination untouched
        if let Some(&out_idx) = self.index.get(&output_node) {
            for (ch, dest) in io.iter_mut().enumerate() {
                let n = num_samples.min(dest.len());
                match self.nodes[out_idx].buffers.get(ch) {
                    Some(buf) => dest[..n].copy_from_slice(&buf[..n]),
                    None => dest[..n].fill(0.0),
                }
            }
        }
    }

    /// Accumulated latency along the longest path into each node
    fn path_latencies(&mut self) -> HashMap<NodeId, usize> {
        self.update_processing_order();

        let mut latencies: HashMap<NodeId, usize> = HashMap::new();
        for &idx in &self.processing_order {
            let id = self.nodes[idx].id;
            let upstream = self
                .connections
                .iter()
                .filter(|c| c.to_node == id)
                .filter_map(|c| latencies.get(&c.from_node).copied())
                .max()
                .unwrap_or(0);
            latencies.insert(id, upstream + self.nodes[idx].node.latency());
        }
        latencies
    }

    /// Latency along the longest path into `node`, including the node
    pub fn path_latency(&mut self, node: NodeId) -> usize {
        self.path_latencies().get(&node).copied().unwrap_or(0)
    }

    /// Total graph latency: the maximum accumulated path latency
    pub fn total_latency(&mut self) -> usize {
        self.path_latencies().values().copied().max().unwrap_or(0)
    }

    /// Insert delay nodes so every path into `output_node` arrives with
    /// the same accumulated latency. Returns the inserted node ids.
    pub fn compensate_latency(&mut self, output_node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        if !self.index.contains_key(&output_node) {
            return Err(GraphError::UnknownNode(output_node));
        }

        let latencies = self.path_latencies();
        let target = latencies
            .iter()
            .filter(|(id, _)| **id != output_node)
            .map(|(_, &lat)| lat)
            .max()
            .unwrap_or(0);

        // Group incoming edges by source so stereo pairs share one delay
        let incoming: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| c.to_node == output_node)
            .copied()
            .collect();

        let mut inserted = Vec::new();
        let mut delays: HashMap<NodeId, NodeId> = HashMap::new();

        for conn in incoming {
            let deficit = target.saturating_sub(
                latencies.get(&conn.from_node).copied().unwrap_or(0),
            );
            if deficit == 0 {
                continue;
            }

            let delay_id = *delays.entry(conn.from_node).or_insert_with(|| {
                let id = self.add_node(Box::new(DelayNode::new(deficit)));
                inserted.push(id);
                id
            });

            self.disconnect(conn.from_node, output_node);
            match self.connect(conn.from_node, conn.from_channel, delay_id, conn.from_channel.min(1))
            {
                Ok(()) | Err(GraphError::DuplicateConnection) => {}
                Err(e) => return Err(e),
            }
            match self.connect(delay_id, conn.from_channel.min(1), output_node, conn.to_channel) {
                Ok(()) | Err(GraphError::DuplicateConnection) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(inserted)
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        for slot in &mut self.nodes {
            slot.node.set_sample_rate(sample_rate);
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.nodes {
            slot.node.reset();
        }
        for slot in &mut self.nodes {
            for buffer in &mut slot.buffers {
                buffer.fill(0.0);
            }
        }
    }
}
