// Peer protocol: message shapes and per-node session state (no transport)

mod message;

pub use message::{
    bytes_to_cmd, cmd_to_bytes, Addr, BlockMsg, Command, GetBlocks, GetData, Inv, InvKind, Message, TxMsg, Version,
    COMMAND_LENGTH, DEFAULT_NODE, PROTOCOL_VERSION,
};

use crate::core::{Hash256, Transaction};
use crate::storage::{Blockchain, ChainError};
use log::{debug, info};
use std::collections::HashMap;

/// State one node keeps about its peers and pending work
///
/// Replies are returned as `(peer, message)` pairs for the caller to deliver.
#[derive(Debug)]
pub struct NodeContext {
    node_address: String,
    known_nodes: Vec<String>,
    blocks_in_transit: Vec<Hash256>,
    mempool: HashMap<Hash256, Transaction>,
}

impl NodeContext {
    pub fn new(node_address: &str) -> Self {
        Self {
            node_address: node_address.to_string(),
            known_nodes: vec![DEFAULT_NODE.to_string()],
            blocks_in_transit: Vec::new(),
            mempool: HashMap::new(),
        }
    }

    pub fn node_address(&self) -> &str {
        &self.node_address
    }

    pub fn known_nodes(&self) -> &[String] {
        &self.known_nodes
    }

    pub fn is_known(&self, node: &str) -> bool {
        self.known_nodes.iter().any(|known| known == node)
    }

    /// Remember `node`; returns `false` if it was already known
    pub fn add_node(&mut self, node: &str) -> bool {
        if self.is_known(node) {
            return false;
        }
        self.known_nodes.push(node.to_string());
        true
    }

    pub fn blocks_in_transit(&self) -> &[Hash256] {
        &self.blocks_in_transit
    }

    pub fn mempool(&self) -> &HashMap<Hash256, Transaction> {
        &self.mempool
    }

    /// Handshake announcing this node's chain height
    pub fn version(&self, chain: &Blockchain) -> Result<Message, ChainError> {
        Ok(Message::Version(Version {
            version: PROTOCOL_VERSION,
            best_height: chain.best_height()?,
            addr_from: self.node_address.clone(),
        }))
    }

    /// React to one received message
    pub fn handle(&mut self, message: Message, chain: &mut Blockchain) -> Result<Vec<(String, Message)>, ChainError> {
        debug!("Received {} message", message.command().as_str());

        let replies = match message {
            Message::Addr(addr) => {
                for node in &addr.addr_list {
                    self.add_node(node);
                }
                info!("There are {} known nodes", self.known_nodes.len());
                Vec::new()
            }
            Message::Version(version) => {
                let our_height = chain.best_height()?;
                let mut replies = Vec::new();
                if our_height < version.best_height {
                    replies.push((version.addr_from.clone(), self.get_blocks()));
                } else if our_height > version.best_height {
                    replies.push((version.addr_from.clone(), self.version(chain)?));
                }
                self.add_node(&version.addr_from);
                replies
            }
            Message::GetBlocks(request) => {
                let items = chain
                    .iter()
                    .map(|block| block.map(|block| block.hash))
                    .collect::<Result<Vec<_>, _>>()?;
                vec![(request.addr_from, self.inv(InvKind::Block, items))]
            }
            Message::Inv(inv) => self.handle_inv(inv),
            Message::GetData(request) => self.handle_get_data(request, chain)?,
            Message::Block(msg) => {
                let block = msg.block()?;
                chain.import_block(&block)?;

                match self.blocks_in_transit.pop() {
                    Some(next) => vec![(msg.addr_from, self.get_data(InvKind::Block, next))],
                    None => Vec::new(),
                }
            }
            Message::Tx(msg) => {
                let tx = msg.transaction()?;
                self.mempool.insert(tx.id, tx);
                Vec::new()
            }
        };

        Ok(replies)
    }

    fn handle_inv(&mut self, inv: Inv) -> Vec<(String, Message)> {
        debug!("Received inventory with {} {}", inv.items.len(), inv.kind.as_str());

        match inv.kind {
            InvKind::Block => {
                // hashes arrive newest first; request from the oldest
                self.blocks_in_transit = inv.items;
                match self.blocks_in_transit.pop() {
                    Some(first) => vec![(inv.addr_from, self.get_data(InvKind::Block, first))],
                    None => Vec::new(),
                }
            }
            InvKind::Tx => inv
                .items
                .into_iter()
                .filter(|id| !self.mempool.contains_key(id))
                .map(|id| (inv.addr_from.clone(), self.get_data(InvKind::Tx, id)))
                .collect(),
        }
    }

    fn handle_get_data(&self, request: GetData, chain: &Blockchain) -> Result<Vec<(String, Message)>, ChainError> {
        let reply = match request.kind {
            InvKind::Block => chain
                .get_block(&request.id)?
                .map(|block| Message::Block(BlockMsg::new(&self.node_address, &block))),
            InvKind::Tx => self
                .mempool
                .get(&request.id)
                .map(|tx| Message::Tx(TxMsg::new(&self.node_address, tx))),
        };
        Ok(reply.map(|message| (request.addr_from, message)).into_iter().collect())
    }

    fn get_blocks(&self) -> Message {
        Message::GetBlocks(GetBlocks {
            addr_from: self.node_address.clone(),
        })
    }

    fn get_data(&self, kind: InvKind, id: Hash256) -> Message {
        Message::GetData(GetData {
            addr_from: self.node_address.clone(),
            kind,
            id,
        })
    }

    fn inv(&self, kind: InvKind, items: Vec<Hash256>) -> Message {
        Message::Inv(Inv {
            addr_from: self.node_address.clone(),
            kind,
            items,
        })
    }
}
