// Licensed under the Apache-2.0 license

use crate::bus::{Bus, BusError, RvAddr, RvData, RvSize};

/// Wraps a bus and traces every access through `log` when enabled.
pub struct BusLogger<TBus: Bus> {
    pub bus: TBus,
    pub enabled: bool,
}

impl<TBus: Bus> BusLogger<TBus> {
    pub fn new(bus: TBus, enabled: bool) -> Self {
        Self { bus, enabled }
    }

    pub fn log_read(
        &self,
        bus_name: &str,
        size: RvSize,
        addr: RvAddr,
        result: Result<RvData, BusError>,
    ) {
        if !self.enabled {
            return;
        }
        let size = usize::from(size);
        match result {
            Ok(val) => log::trace!("{bus_name}  read{size} *0x{addr:08x} -> 0x{val:x}"),
            Err(e) => log::trace!("{bus_name}  read{size}  *0x{addr:08x} ***FAULT {e:?}"),
        }
    }

    pub fn log_write(
        &self,
        bus_name: &str,
        size: RvSize,
        addr: RvAddr,
        val: RvData,
        result: Result<(), BusError>,
    ) {
        if !self.enabled {
            return;
        }
        let size = usize::from(size);
        match result {
            Ok(()) => log::trace!("{bus_name} write{size} *0x{addr:08x} <- 0x{val:x}"),
            Err(e) => {
                log::trace!("{bus_name} write{size} *0x{addr:08x} <- 0x{val:x} ***FAULT {e:?}")
            }
        }
    }
}

impl<TBus: Bus> Bus for BusLogger<TBus> {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        let result = self.bus.read(size, addr);
        self.log_read("SoC", size, addr, result);
        result
    }

    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        let result = self.bus.write(size, addr, val);
        self.log_write("SoC", size, addr, val, result);
        result
    }
}
