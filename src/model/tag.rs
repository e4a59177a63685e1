use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegisterTable {
    DiscreteInput,
    Coils,
    InputRegisters,
    HoldingRegisters,
}

impl RegisterTable {
    pub fn is_bit_table(&self) -> bool {
        matches!(self, RegisterTable::Coils | RegisterTable::DiscreteInput)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,

    UnsignedInteger16,
    SignedInteger16,

    UnsignedInteger32,
    SignedInteger32,

    Float,
    Double,
}

impl DataType {
    /// Number of 16 bit words the type spans in a register table.
    pub fn word_count(&self) -> u16 {
        match self {
            DataType::Boolean | DataType::UnsignedInteger16 | DataType::SignedInteger16 => 1,
            DataType::UnsignedInteger32 | DataType::SignedInteger32 | DataType::Float => 2,
            DataType::Double => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagConfig {
    pub name: String,
    pub table: RegisterTable,
    pub address: u16,
    pub data_type: DataType,

    //Only used for booleans packed inside a register
    #[serde(default)]
    pub bit: Option<u8>,
    #[serde(default)]
    pub byte_swap: bool,
    #[serde(default)]
    pub word_swap: bool,
}

impl TagConfig {
    /// Amount of coils or registers the tag occupies starting at `address`.
    pub fn register_count(&self) -> u16 {
        if self.table.is_bit_table() {
            1
        } else {
            self.data_type.word_count()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.is_bit_table() && self.data_type != DataType::Boolean {
            return Err(anyhow!(
                "Coils and DiscreteInput tables only support Boolean data types"
            ));
        }

        if self.table.is_bit_table() && self.bit.is_some() {
            return Err(anyhow!("Coils and DiscreteInput tables don't take a bit index"));
        }

        if let Some(bit) = self.bit {
            if self.data_type != DataType::Boolean {
                return Err(anyhow!("Bit index is only meaningful for Boolean values"));
            }
            if bit > 15 {
                return Err(anyhow!("Bit index {} is out of a 16 bit register", bit));
            }
        }

        if u32::from(self.address) + u32::from(self.register_count()) > u32::from(u16::MAX) + 1 {
            return Err(anyhow!(
                "Value starting at {} doesn't fit in the address space",
                self.address
            ));
        }

        Ok(())
    }
}
