use crate::error::DataQualityError;
use crate::model::{DataType, TagConfig, Value};

/// Raw data returned by the controller for a single tag.
#[derive(Clone, Debug, PartialEq)]
pub enum RawTag {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

fn words_to_bytes(words: &[u16], byte_swap: bool, word_swap: bool) -> Vec<u8> {
    let mut words = words.to_vec();

    // Swap each pair of words (low word first devices)
    if word_swap {
        for pair in words.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }

    let mut result = Vec::with_capacity(words.len() * 2);
    for word in words {
        if byte_swap {
            result.extend_from_slice(&word.to_le_bytes());
        } else {
            result.extend_from_slice(&word.to_be_bytes());
        }
    }

    result
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], DataQualityError> {
    bytes
        .get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| DataQualityError::Decode(format!("expected {} bytes, got {}", N, bytes.len())))
}

pub fn decode(raw: RawTag, config: &TagConfig) -> Result<Value, DataQualityError> {
    match raw {
        RawTag::Bits(bits) => match config.data_type {
            DataType::Boolean => bits
                .first()
                .copied()
                .map(Value::Boolean)
                .ok_or(DataQualityError::Missing),
            other => Err(DataQualityError::Decode(format!(
                "{:?} can't be read from a bit table",
                other
            ))),
        },
        RawTag::Words(words) => {
            if words.len() < config.data_type.word_count() as usize {
                return Err(DataQualityError::Decode(format!(
                    "{:?} needs {} registers, got {}",
                    config.data_type,
                    config.data_type.word_count(),
                    words.len()
                )));
            }

            let bytes = words_to_bytes(&words, config.byte_swap, config.word_swap);

            let value = match config.data_type {
                DataType::Boolean => {
                    let bit = config.bit.unwrap_or(0);
                    return Ok(Value::Boolean((words[0] >> bit) & 1 == 1));
                }
                DataType::UnsignedInteger16 => u16::from_be_bytes(fixed(&bytes)?) as f64,
                DataType::SignedInteger16 => i16::from_be_bytes(fixed(&bytes)?) as f64,
                DataType::UnsignedInteger32 => u32::from_be_bytes(fixed(&bytes)?) as f64,
                DataType::SignedInteger32 => i32::from_be_bytes(fixed(&bytes)?) as f64,
                DataType::Float => f32::from_be_bytes(fixed(&bytes)?) as f64,
                DataType::Double => f64::from_be_bytes(fixed(&bytes)?),
            };

            if !value.is_finite() {
                return Err(DataQualityError::Decode(format!("{} is not a finite value", value)));
            }

            Ok(Value::Analog(value))
        }
    }
}
