// Network protocol messages

use crate::core::serialize::{
    read_hash, read_length, read_u32, read_u64, read_var_bytes, read_var_str, write_var_bytes, write_var_str,
    write_varint,
};
use crate::core::{Block, Hash256, Serializable, SerializeError, Transaction};
use std::io::{self, Read, Write};

/// Bumped on every backwards-incompatible message change
pub const PROTOCOL_VERSION: u32 = 1;

/// Width of the zero-padded command name in a frame
pub const COMMAND_LENGTH: usize = 12;

/// Seed node every context starts out knowing
pub const DEFAULT_NODE: &str = "localhost:3000";

/// Zero-pad a command name to `COMMAND_LENGTH` bytes; longer names are cut
pub fn cmd_to_bytes(command: &str) -> [u8; COMMAND_LENGTH] {
    let mut bytes = [0u8; COMMAND_LENGTH];
    let len = command.len().min(COMMAND_LENGTH);
    bytes[..len].copy_from_slice(&command.as_bytes()[..len]);
    bytes
}

/// Command name from its padded form; zero bytes are dropped
pub fn bytes_to_cmd(bytes: &[u8]) -> String {
    let command: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8_lossy(&command).into_owned()
}

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Addr,
    Block,
    GetBlocks,
    GetData,
    Inv,
    Tx,
    Version,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Addr => "addr",
            Command::Block => "block",
            Command::GetBlocks => "getblocks",
            Command::GetData => "getdata",
            Command::Inv => "inv",
            Command::Tx => "tx",
            Command::Version => "version",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "addr" => Some(Command::Addr),
            "block" => Some(Command::Block),
            "getblocks" => Some(Command::GetBlocks),
            "getdata" => Some(Command::GetData),
            "inv" => Some(Command::Inv),
            "tx" => Some(Command::Tx),
            "version" => Some(Command::Version),
            _ => None,
        }
    }
}

/// What an inventory or data request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvKind {
    Block,
    Tx,
}

impl InvKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvKind::Block => "block",
            InvKind::Tx => "tx",
        }
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self, SerializeError> {
        match read_var_str(reader)?.as_str() {
            "block" => Ok(InvKind::Block),
            "tx" => Ok(InvKind::Tx),
            other => Err(SerializeError::Invalid(format!("unknown inventory kind {:?}", other))),
        }
    }
}

/// Known peer addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addr {
    pub addr_list: Vec<String>,
}

/// One serialized block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMsg {
    pub addr_from: String,
    pub block: Vec<u8>,
}

impl BlockMsg {
    pub fn new(addr_from: &str, block: &Block) -> Self {
        Self {
            addr_from: addr_from.to_string(),
            block: block.serialize(),
        }
    }

    pub fn block(&self) -> Result<Block, SerializeError> {
        Block::deserialize(&self.block)
    }
}

/// Request for the sender's block hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocks {
    pub addr_from: String,
}

/// Request for one block or transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetData {
    pub addr_from: String,
    pub kind: InvKind,
    pub id: Hash256,
}

/// Announcement of blocks or transactions the sender holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inv {
    pub addr_from: String,
    pub kind: InvKind,
    pub items: Vec<Hash256>,
}

/// One serialized transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMsg {
    pub addr_from: String,
    pub transaction: Vec<u8>,
}

impl TxMsg {
    pub fn new(addr_from: &str, tx: &Transaction) -> Self {
        Self {
            addr_from: addr_from.to_string(),
            transaction: tx.serialize(),
        }
    }

    pub fn transaction(&self) -> Result<Transaction, SerializeError> {
        Transaction::deserialize(&self.transaction)
    }
}

/// Handshake carrying the sender's chain height
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: u32,
    pub best_height: u64,
    pub addr_from: String,
}

/// Network message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Addr(Addr),
    Block(BlockMsg),
    GetBlocks(GetBlocks),
    GetData(GetData),
    Inv(Inv),
    Tx(TxMsg),
    Version(Version),
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Addr(_) => Command::Addr,
            Message::Block(_) => Command::Block,
            Message::GetBlocks(_) => Command::GetBlocks,
            Message::GetData(_) => Command::GetData,
            Message::Inv(_) => Command::Inv,
            Message::Tx(_) => Command::Tx,
            Message::Version(_) => Command::Version,
        }
    }

    fn encode_payload<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Message::Addr(addr) => {
                write_varint(writer, addr.addr_list.len() as u64)?;
                for node in &addr.addr_list {
                    write_var_str(writer, node)?;
                }
                Ok(())
            }
            Message::Block(msg) => {
                write_var_str(writer, &msg.addr_from)?;
                write_var_bytes(writer, &msg.block)
            }
            Message::GetBlocks(msg) => write_var_str(writer, &msg.addr_from),
            Message::GetData(msg) => {
                write_var_str(writer, &msg.addr_from)?;
                write_var_str(writer, msg.kind.as_str())?;
                writer.write_all(msg.id.as_bytes())
            }
            Message::Inv(inv) => {
                write_var_str(writer, &inv.addr_from)?;
                write_var_str(writer, inv.kind.as_str())?;
                write_varint(writer, inv.items.len() as u64)?;
                for item in &inv.items {
                    writer.write_all(item.as_bytes())?;
                }
                Ok(())
            }
            Message::Tx(msg) => {
                write_var_str(writer, &msg.addr_from)?;
                write_var_bytes(writer, &msg.transaction)
            }
            Message::Version(msg) => {
                writer.write_all(&msg.version.to_le_bytes())?;
                writer.write_all(&msg.best_height.to_le_bytes())?;
                write_var_str(writer, &msg.addr_from)
            }
        }
    }

    fn decode_payload<R: Read>(command: Command, reader: &mut R) -> Result<Self, SerializeError> {
        let message = match command {
            Command::Addr => {
                let count = read_length(reader)?;
                let mut addr_list = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    addr_list.push(read_var_str(reader)?);
                }
                Message::Addr(Addr { addr_list })
            }
            Command::Block => Message::Block(BlockMsg {
                addr_from: read_var_str(reader)?,
                block: read_var_bytes(reader)?,
            }),
            Command::GetBlocks => Message::GetBlocks(GetBlocks {
                addr_from: read_var_str(reader)?,
            }),
            Command::GetData => Message::GetData(GetData {
                addr_from: read_var_str(reader)?,
                kind: InvKind::read(reader)?,
                id: read_hash(reader)?,
            }),
            Command::Inv => {
                let addr_from = read_var_str(reader)?;
                let kind = InvKind::read(reader)?;
                let count = read_length(reader)?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(read_hash(reader)?);
                }
                Message::Inv(Inv { addr_from, kind, items })
            }
            Command::Tx => Message::Tx(TxMsg {
                addr_from: read_var_str(reader)?,
                transaction: read_var_bytes(reader)?,
            }),
            Command::Version => Message::Version(Version {
                version: read_u32(reader)?,
                best_height: read_u64(reader)?,
                addr_from: read_var_str(reader)?,
            }),
        };
        Ok(message)
    }
}

/// Frame: command (12 bytes, zero padded) || payload length (u32 LE) || payload
impl Serializable for Message {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut payload = Vec::new();
        self.encode_payload(&mut payload)?;

        writer.write_all(&cmd_to_bytes(self.command().as_str()))?;
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(&payload)
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self, SerializeError> {
        let mut command_bytes = [0u8; COMMAND_LENGTH];
        reader.read_exact(&mut command_bytes)?;
        let name = bytes_to_cmd(&command_bytes);
        let command =
            Command::from_name(&name).ok_or_else(|| SerializeError::Invalid(format!("unknown command {:?}", name)))?;

        let payload_len = read_u32(reader)? as usize;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        let mut cursor = io::Cursor::new(payload.as_slice());
        let message = Self::decode_payload(command, &mut cursor)?;
        if cursor.position() as usize != payload_len {
            return Err(SerializeError::Invalid(format!("{} payload carries trailing bytes", name)));
        }
        Ok(message)
    }
}
