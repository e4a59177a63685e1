use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use crate::model::tag::{DataType, TagConfig};
use crate::model::TagInfo;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn default_port() -> u16 {
    502
}

fn default_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_max_registers_per_request() -> u16 {
    125
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_feed_capacity() -> usize {
    16
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlcConfig {
    #[serde(default = "default_ip")]
    pub ip: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    pub canary_tag: String,
    #[serde(default = "default_max_registers_per_request")]
    pub max_registers_per_request: u16,
    #[serde(default)]
    pub max_gap_in_request: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistorianConfig {
    pub plc: PlcConfig,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    #[serde(default)]
    pub analog_tags: Vec<TagConfig>,
    #[serde(default)]
    pub boolean_tags: Vec<TagConfig>,
    #[serde(default)]
    pub metadata: Vec<TagInfo>,
}

impl HistorianConfig {
    pub fn analog_names(&self) -> Vec<String> {
        self.analog_tags.iter().map(|tag| tag.name.clone()).collect()
    }

    pub fn boolean_names(&self) -> Vec<String> {
        self.boolean_tags.iter().map(|tag| tag.name.clone()).collect()
    }

    /// Every configured tag, analog first, in config order.
    pub fn all_tags(&self) -> impl Iterator<Item = &TagConfig> {
        self.analog_tags.iter().chain(self.boolean_tags.iter())
    }

    pub fn validate(&self) -> Result<()> {
        let mut error_string = String::new();

        if self.analog_tags.is_empty() && self.boolean_tags.is_empty() {
            error_string += "No tags were configured\n";
        }

        for tag in &self.analog_tags {
            if let Err(err) = tag.validate() {
                error_string += &format!("\t{}: {}\n", tag.name, err);
            }
            if tag.data_type == DataType::Boolean {
                error_string += &format!("\t{}: analog tags can't be Boolean\n", tag.name);
            }
        }

        for tag in &self.boolean_tags {
            if let Err(err) = tag.validate() {
                error_string += &format!("\t{}: {}\n", tag.name, err);
            }
            if tag.data_type != DataType::Boolean {
                error_string += &format!("\t{}: boolean tags must be Boolean\n", tag.name);
            }
        }

        let mut name_set = HashSet::new();
        let mut repeated_set = HashSet::new();

        for tag in self.all_tags() {
            if !name_set.insert(tag.name.clone()) && !repeated_set.contains(&tag.name) {
                error_string += &format!(
                    "Repeated tag names: {} was defined more than once\n",
                    tag.name
                );
                repeated_set.insert(tag.name.clone());
            }
        }

        if !name_set.contains(&self.plc.canary_tag) {
            error_string += &format!(
                "Canary tag {} is not one of the configured tags\n",
                self.plc.canary_tag
            );
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            error_string += &format!(
                "Poll interval {:?} is below the minimum of {:?}\n",
                self.poll_interval, MIN_POLL_INTERVAL
            );
        }

        if self.plc.timeout.is_zero() {
            error_string += "PLC timeout must be greater than zero\n";
        }

        if self.plc.max_registers_per_request == 0 {
            error_string += "max_registers_per_request must be greater than zero\n";
        }

        if self.feed_capacity == 0 {
            error_string += "feed_capacity must be greater than zero\n";
        }

        if error_string.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(error_string))
        }
    }
}
