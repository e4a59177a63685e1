use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::{Client, Reader, Slave};
use tracing::debug;

use crate::error::{ConnectionError, DataQualityError, LinkError};
use crate::link::decode::{self, RawTag};
use crate::link::{TagDriver, TagRead};
use crate::model::{PlcConfig, RegisterTable, TagConfig, Value};

// Protocol limit for a single read coils / discrete inputs request
const MAX_BITS_PER_REQUEST: u16 = 2000;

/// One Modbus read request covering several tags.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub table: RegisterTable,
    pub starting_address: u16,
    pub ammount: u16,
    /// (position in the batch, tag config)
    pub members: Vec<(usize, TagConfig)>,
}

impl Query {
    fn ending_address(&self) -> u32 {
        u32::from(self.starting_address) + u32::from(self.ammount) - 1
    }
}

/// Groups the requested tags into as few requests as the limits allow.
/// Tags that aren't mapped are returned apart with their batch position.
pub fn build_queries(
    tags: &[String],
    catalog: &HashMap<String, TagConfig>,
    max_registers: u16,
    max_gap: u16,
) -> (Vec<Query>, Vec<usize>) {
    let mut unknown = vec![];
    let mut table_divided: BTreeMap<RegisterTable, Vec<(usize, TagConfig)>> = BTreeMap::new();

    for (position, name) in tags.iter().enumerate() {
        match catalog.get(name) {
            Some(config) => table_divided
                .entry(config.table)
                .or_default()
                .push((position, config.clone())),
            None => unknown.push(position),
        }
    }

    let mut queries = vec![];

    for (table, mut values) in table_divided {
        values.sort_by_key(|(_, config)| config.address);

        let max_ammount = if table.is_bit_table() {
            MAX_BITS_PER_REQUEST
        } else {
            max_registers
        };

        let mut table_queries: Vec<Query> = vec![];

        for (position, config) in values {
            let ending_register = u32::from(config.address) + u32::from(config.register_count()) - 1;

            if let Some(last_query) = table_queries.last_mut() {
                let last_end = last_query.ending_address();
                let gap = i64::from(config.address) - i64::from(last_end) - 1;
                let new_end = ending_register.max(last_end);
                let ammount = new_end - u32::from(last_query.starting_address) + 1;

                if gap <= i64::from(max_gap) && ammount <= u32::from(max_ammount) {
                    last_query.ammount = ammount as u16;
                    last_query.members.push((position, config));
                    continue;
                }
            }

            table_queries.push(Query {
                table,
                starting_address: config.address,
                ammount: config.register_count(),
                members: vec![(position, config)],
            });
        }

        queries.extend(table_queries);
    }

    (queries, unknown)
}

/// Slices the answer of a query into each member tag and decodes it.
fn split_response(query: &Query, response: RawTag) -> Vec<(usize, Result<Value, DataQualityError>)> {
    query
        .members
        .iter()
        .map(|(position, config)| {
            let offset = (config.address - query.starting_address) as usize;
            let count = config.register_count() as usize;

            let raw = match &response {
                RawTag::Bits(bits) => bits.get(offset..offset + count).map(|bits| RawTag::Bits(bits.to_vec())),
                RawTag::Words(words) => words
                    .get(offset..offset + count)
                    .map(|words| RawTag::Words(words.to_vec())),
            };

            let value = raw
                .ok_or(DataQualityError::Missing)
                .and_then(|raw| decode::decode(raw, config));

            (*position, value)
        })
        .collect()
}

/// Tag driver talking Modbus TCP to a single unit.
pub struct ModbusDriver {
    address: SocketAddr,
    unit_id: u8,
    max_registers: u16,
    max_gap: u16,
    catalog: HashMap<String, TagConfig>,
    context: Option<Context>,
}

impl ModbusDriver {
    pub fn new(config: &PlcConfig, tags: impl IntoIterator<Item = TagConfig>) -> Self {
        ModbusDriver {
            address: SocketAddr::new(config.ip, config.port),
            unit_id: config.unit_id,
            max_registers: config.max_registers_per_request,
            max_gap: config.max_gap_in_request,
            catalog: tags.into_iter().map(|tag| (tag.name.clone(), tag)).collect(),
            context: None,
        }
    }

    async fn run_query(context: &mut Context, query: &Query) -> Result<Result<RawTag, String>, LinkError> {
        let address = query.starting_address;
        let ammount = query.ammount;

        let response = match query.table {
            RegisterTable::Coils => context
                .read_coils(address, ammount)
                .await
                .map(|inner| inner.map(RawTag::Bits)),
            RegisterTable::DiscreteInput => context
                .read_discrete_inputs(address, ammount)
                .await
                .map(|inner| inner.map(RawTag::Bits)),
            RegisterTable::InputRegisters => context
                .read_input_registers(address, ammount)
                .await
                .map(|inner| inner.map(RawTag::Words)),
            RegisterTable::HoldingRegisters => context
                .read_holding_registers(address, ammount)
                .await
                .map(|inner| inner.map(RawTag::Words)),
        };

        response
            .map(|inner| inner.map_err(|exception| format!("{:?}", exception)))
            .map_err(|err| LinkError::Transport(err.to_string()))
    }
}

#[async_trait]
impl TagDriver for ModbusDriver {
    async fn open(&mut self) -> Result<(), ConnectionError> {
        // A previous handle could still be around after a failed verification
        self.context = None;

        let context = tcp::connect_slave(self.address, Slave(self.unit_id))
            .await
            .map_err(|err| ConnectionError::Open(format!("{}: {}", self.address, err)))?;

        self.context = Some(context);
        debug!("Modbus connection opened to {}", self.address);
        Ok(())
    }

    async fn read(&mut self, tags: &[String]) -> Result<Vec<TagRead>, LinkError> {
        let context = self.context.as_mut().ok_or(LinkError::NotConnected)?;

        let (queries, unknown) = build_queries(tags, &self.catalog, self.max_registers, self.max_gap);

        let mut values: Vec<Result<Value, DataQualityError>> =
            vec![Err(DataQualityError::Missing); tags.len()];

        for position in unknown {
            values[position] = Err(DataQualityError::UnknownTag);
        }

        for query in &queries {
            match Self::run_query(context, query).await? {
                Ok(response) => {
                    for (position, value) in split_response(query, response) {
                        values[position] = value;
                    }
                }
                Err(exception) => {
                    debug!(
                        "Modbus exception {} reading {:?} {}..+{}",
                        exception, query.table, query.starting_address, query.ammount
                    );
                    for (position, _) in &query.members {
                        values[*position] = Err(DataQualityError::Exception(exception.clone()));
                    }
                }
            }
        }

        debug!("Modbus batch of {} tags sent as {} queries", tags.len(), queries.len());

        Ok(tags
            .iter()
            .zip(values)
            .map(|(tag_name, value)| TagRead {
                tag_name: tag_name.clone(),
                value,
            })
            .collect())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        if let Some(mut context) = self.context.take() {
            context
                .disconnect()
                .await
                .map_err(|err| LinkError::Transport(err.to_string()))?;
            debug!("Modbus connection to {} closed", self.address);
        }
        Ok(())
    }
}
