//! Point collections carried by messages: bit-packed discretes and big-endian registers.

use std::fmt;

use crate::error::ModbusError;

fn join_values<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: impl Iterator<Item = T>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, v) in values.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "}}")
}

/// Ordered coil / discrete input values.
///
/// On the wire element 0 is bit 0 of byte 0; the last byte is zero-padded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscreteCollection {
    bits: Vec<bool>,
}

impl DiscreteCollection {
    #[must_use]
    pub const fn new() -> Self {
        Self { bits: Vec::new() }
    }

    #[must_use]
    pub fn from_values(values: impl Into<Vec<bool>>) -> Self {
        Self {
            bits: values.into(),
        }
    }

    /// Unpack every bit of `bytes`, so the result holds `bytes.len() * 8` elements.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let bits = bytes
            .iter()
            .flat_map(|b| (0..8).map(move |i| (b >> i) & 0x01 != 0))
            .collect();
        Self { bits }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// `ceil(count / 8)`
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.bits.len().div_ceil(8)
    }

    #[must_use]
    pub fn network_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.byte_count()];
        for (i, _) in self.bits.iter().enumerate().filter(|(_, b)| **b) {
            out[i / 8] |= 1 << (i % 8);
        }
        out
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: bool) -> Result<(), ModbusError> {
        let len = self.bits.len();
        let slot = self
            .bits
            .get_mut(index)
            .ok_or_else(|| ModbusError::Range(format!("index {index} beyond {len} discretes")))?;
        *slot = value;
        Ok(())
    }

    pub fn push(&mut self, value: bool) {
        self.bits.push(value);
    }

    /// Remove and return the element at `index`, shifting the rest down.
    pub fn remove_at(&mut self, index: usize) -> Result<bool, ModbusError> {
        if index >= self.bits.len() {
            return Err(ModbusError::Range(format!(
                "index {index} beyond {} discretes",
                self.bits.len()
            )));
        }
        Ok(self.bits.remove(index))
    }

    /// Keep only the first `len` elements (drops the padding bits of a decoded byte block).
    pub fn truncate(&mut self, len: usize) {
        self.bits.truncate(len);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<bool> {
        self.bits
    }
}

impl From<Vec<bool>> for DiscreteCollection {
    fn from(bits: Vec<bool>) -> Self {
        Self { bits }
    }
}

impl fmt::Display for DiscreteCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join_values(f, self.bits.iter().map(|b| u8::from(*b)))
    }
}

/// Ordered 16-bit register values, big-endian on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterCollection {
    words: Vec<u16>,
}

impl RegisterCollection {
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    #[must_use]
    pub fn from_values(values: impl Into<Vec<u16>>) -> Self {
        Self {
            words: values.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModbusError> {
        if bytes.len() % 2 != 0 {
            return Err(ModbusError::format(
                "register data must be an even number of bytes",
                bytes.len(),
            ));
        }
        let words = bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        Ok(Self { words })
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.words.len() * 2
    }

    #[must_use]
    pub fn network_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<u16> {
        self.words.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: u16) -> Result<(), ModbusError> {
        let len = self.words.len();
        let slot = self
            .words
            .get_mut(index)
            .ok_or_else(|| ModbusError::Range(format!("index {index} beyond {len} registers")))?;
        *slot = value;
        Ok(())
    }

    pub fn push(&mut self, value: u16) {
        self.words.push(value);
    }

    pub fn remove_at(&mut self, index: usize) -> Result<u16, ModbusError> {
        if index >= self.words.len() {
            return Err(ModbusError::Range(format!(
                "index {index} beyond {} registers",
                self.words.len()
            )));
        }
        Ok(self.words.remove(index))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u16] {
        &self.words
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u16> {
        self.words
    }
}

impl From<Vec<u16>> for RegisterCollection {
    fn from(words: Vec<u16>) -> Self {
        Self { words }
    }
}

impl fmt::Display for RegisterCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join_values(f, self.words.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discretes_from_bytes_lsb_first() {
        let c = DiscreteCollection::from_bytes(&[194]);
        assert_eq!(
            c.as_slice(),
            &[false, true, false, false, false, false, true, true]
        );
        assert_eq!(DiscreteCollection::from_bytes(&[1, 2, 3]).count(), 24);
    }

    #[test]
    fn discrete_network_bytes_pad_last_byte() {
        let c = DiscreteCollection::from_values(vec![
            true, false, true, true, false, false, true, true, true, false,
        ]);
        assert_eq!(c.byte_count(), 2);
        assert_eq!(c.network_bytes(), vec![205, 1]);
    }

    #[test]
    fn byte_count_follows_remove_at() {
        let mut c = DiscreteCollection::from_values(vec![true; 16]);
        assert_eq!(c.byte_count(), 2);
        c.remove_at(0).expect("remove");
        assert_eq!(c.count(), 15);
        assert_eq!(c.byte_count(), 2);
        assert_eq!(c.network_bytes(), vec![0xFF, 0x7F]);

        let mut c = DiscreteCollection::from_values(vec![false; 9]);
        assert_eq!(c.byte_count(), 2);
        c.remove_at(8).expect("remove");
        assert_eq!(c.byte_count(), 1);
        assert_eq!(c.network_bytes().len(), 1);
    }

    #[test]
    fn discrete_set_out_of_range() {
        let mut c = DiscreteCollection::from_values(vec![false; 2]);
        c.set(1, true).expect("set");
        assert_eq!(c.get(1), Some(true));
        assert!(matches!(c.set(2, true), Err(ModbusError::Range(_))));
        assert!(c.remove_at(5).is_err());
    }

    #[test]
    fn registers_big_endian() {
        let c = RegisterCollection::from_bytes(&[0, 1, 0, 2, 0, 3]).expect("decode");
        assert_eq!(c.as_slice(), &[1, 2, 3]);
        let c = RegisterCollection::from_values(vec![5, 3, 4, 6]);
        assert_eq!(c.network_bytes(), vec![0, 5, 0, 3, 0, 4, 0, 6]);
        assert_eq!(c.byte_count(), 8);
    }

    #[test]
    fn registers_odd_bytes_rejected() {
        assert!(matches!(
            RegisterCollection::from_bytes(&[0, 1, 2]),
            Err(ModbusError::Format { frame_len: 3, .. })
        ));
    }

    #[test]
    fn register_mutation() {
        let mut c = RegisterCollection::new();
        c.push(7);
        c.push(8);
        c.set(0, 9).expect("set");
        assert_eq!(c.remove_at(1).expect("remove"), 8);
        assert_eq!(c.as_slice(), &[9]);
        assert_eq!(c.byte_count(), 2);
    }

    #[test]
    fn display() {
        assert_eq!(
            DiscreteCollection::from_values(vec![true, false, true]).to_string(),
            "{1, 0, 1}"
        );
        assert_eq!(RegisterCollection::from_values(vec![5, 3]).to_string(), "{5, 3}");
        assert_eq!(RegisterCollection::new().to_string(), "{}");
    }
}
