/// Trait for an object that owns an address bus
pub trait Motherboard {
    /// Read from the bus at the given address, triggering any possible side-effects
    fn read(&mut self, addr: u16) -> u8;

    /// Attempt to determinisitcally read from the bus
    ///
    /// This should return None if such a read is not possible without
    /// side-effects or determinism (for instance, open bus reads or soft
    /// switches whose value depends on machine state a plain peek can't see)
    fn peek(&self, addr: u16) -> Option<u8>;

    /// Write to the bus with the given data
    fn write(&mut self, addr: u16, data: u8);
}

#[derive(Debug, Eq, PartialEq)]
pub enum BusPeekResult {
    Unmapped,
    MutableRead,
    Result(u8),
}

impl BusPeekResult {
    /// Unwrap a BusPeekResult to an u8
    pub fn unwrap(&self, last_bus_value: u8) -> u8 {
        match self {
            BusPeekResult::Result(val) => *val,
            _ => last_bus_value,
        }
    }

    /// Convert a BusPeekResult into an Option<u8>
    pub fn to_optional(&self) -> Option<u8> {
        match self {
            BusPeekResult::Result(val) => Some(*val),
            _ => None,
        }
    }
}
