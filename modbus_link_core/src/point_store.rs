use std::sync::RwLock;

use crate::error::ModbusError;

/// Number of addressable points per space (16-bit address).
pub const ADDRESS_SPACE: usize = 0x1_0000;

/// One dense, 16-bit addressed point space.
///
/// Ranges are checked against the end of the address space and rejected as a
/// whole; a request never gets a shortened answer.
pub struct PointSource<T> {
    points: RwLock<Vec<T>>,
}

// the full space is 65536 entries; keep Debug output readable
impl<T> std::fmt::Debug for PointSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointSource").finish_non_exhaustive()
    }
}

impl<T: Copy + Default + PartialEq> PointSource<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            points: RwLock::new(vec![T::default(); ADDRESS_SPACE]),
        }
    }

    fn check_range(start: u16, count: usize) -> Result<(), ModbusError> {
        let end = usize::from(start) + count;
        if end > ADDRESS_SPACE {
            return Err(ModbusError::IllegalDataAddress(format!(
                "start {start} + count {count} exceeds address space"
            )));
        }
        Ok(())
    }

    pub fn read_points(&self, start: u16, count: usize) -> Result<Vec<T>, ModbusError> {
        Self::check_range(start, count)?;
        let points = self
            .points
            .read()
            .map_err(|_| ModbusError::Protocol("point store poisoned".into()))?;
        let s = usize::from(start);
        Ok(points[s..s + count].to_vec())
    }

    pub fn write_points(&self, start: u16, values: &[T]) -> Result<(), ModbusError> {
        Self::check_range(start, values.len())?;
        let mut points = self
            .points
            .write()
            .map_err(|_| ModbusError::Protocol("point store poisoned".into()))?;
        let s = usize::from(start);
        points[s..s + values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Addresses holding a non-default value, in address order.
    pub fn non_default_points(&self) -> Result<Vec<(u16, T)>, ModbusError> {
        let points = self
            .points
            .read()
            .map_err(|_| ModbusError::Protocol("point store poisoned".into()))?;
        Ok(points
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != T::default())
            .filter_map(|(i, v)| u16::try_from(i).ok().map(|a| (a, *v)))
            .collect())
    }
}

impl<T: Copy + Default + PartialEq> Default for PointSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The four point spaces of one slave unit.
#[derive(Debug, Default)]
pub struct SlaveDataStore {
    pub holding_registers: PointSource<u16>,
    pub input_registers: PointSource<u16>,
    pub coil_discretes: PointSource<bool>,
    pub coil_inputs: PointSource<bool>,
}

impl SlaveDataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let store = SlaveDataStore::new();
        store
            .holding_registers
            .write_points(10, &[1, 2, 3])
            .expect("write");
        assert_eq!(
            store.holding_registers.read_points(9, 5).expect("read"),
            vec![0, 1, 2, 3, 0]
        );
        // spaces are independent
        assert_eq!(store.input_registers.read_points(10, 1).expect("read"), vec![0]);
    }

    #[test]
    fn top_of_address_space() {
        let src: PointSource<bool> = PointSource::new();
        src.write_points(0xFFFF, &[true]).expect("last address");
        assert_eq!(src.read_points(0xFFFE, 2).expect("read"), vec![false, true]);
        assert!(matches!(
            src.read_points(0xFFFF, 2),
            Err(ModbusError::IllegalDataAddress(_))
        ));
        assert!(src.write_points(0xFFFE, &[true, true, true]).is_err());
    }

    #[test]
    fn non_default_listing() {
        let src: PointSource<u16> = PointSource::new();
        src.write_points(100, &[0, 7]).expect("write");
        assert_eq!(src.non_default_points().expect("list"), vec![(101, 7)]);
    }
}
