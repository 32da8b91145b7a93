//! SD slot supply on the board's PCAL6416A I/O expander.
//!
//! The slot is fed through a P-channel MOSFET gated by expander pin 11, so
//! the card only has power while that pin is an output driven low.

use embedded_hal::{delay::DelayNs, i2c::I2c};

pub const IO_EXPANDER_ADDR: u8 = 0x20;
pub const SD_PMOS_PIN: u8 = 11;
pub const SD_POWER_SETTLE_MS: u32 = 50;

const REG_OUTPUT_PORT0: u8 = 0x02;
const REG_CONFIG_PORT0: u8 = 0x06;
const PIN_MAX: u8 = 15;

#[derive(Debug, PartialEq, Eq)]
pub enum PowerError<E> {
    I2c(E),
    InvalidPin(u8),
}

pub struct SlotPower<I2C> {
    i2c: I2C,
    addr: u8,
    pin: u8,
}

impl<I2C: I2c> SlotPower<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_pin(i2c, IO_EXPANDER_ADDR, SD_PMOS_PIN)
    }

    pub fn with_pin(i2c: I2C, addr: u8, pin: u8) -> Self {
        Self { i2c, addr, pin }
    }

    /// Switches the slot supply on and waits for the card to settle.
    pub fn power_on(&mut self, delay: &mut impl DelayNs) -> Result<(), PowerError<I2C::Error>> {
        if self.pin > PIN_MAX {
            return Err(PowerError::InvalidPin(self.pin));
        }
        let port = self.pin / 8;
        let mask = 1u8 << (self.pin % 8);
        let output_reg = REG_OUTPUT_PORT0 + port;
        let config_reg = REG_CONFIG_PORT0 + port;

        let output = self.read_reg(output_reg, delay)? & !mask;
        let config = self.read_reg(config_reg, delay)? & !mask;
        // Latch the low level first so the gate never sees a high output.
        self.write_reg(output_reg, output, delay)?;
        self.write_reg(config_reg, config, delay)?;

        log::debug!("power: sd_slot_on addr={:#04x} pin={}", self.addr, self.pin);
        delay.delay_ms(SD_POWER_SETTLE_MS);
        Ok(())
    }

    fn read_reg(
        &mut self,
        reg: u8,
        delay: &mut impl DelayNs,
    ) -> Result<u8, PowerError<I2C::Error>> {
        let mut buf = [0u8; 1];
        if self.i2c.write_read(self.addr, &[reg], &mut buf).is_err() {
            delay.delay_ms(1);
            self.i2c
                .write_read(self.addr, &[reg], &mut buf)
                .map_err(PowerError::I2c)?;
        }
        Ok(buf[0])
    }

    fn write_reg(
        &mut self,
        reg: u8,
        value: u8,
        delay: &mut impl DelayNs,
    ) -> Result<(), PowerError<I2C::Error>> {
        match self.i2c.write(self.addr, &[reg, value]) {
            Ok(()) => Ok(()),
            Err(_) => {
                delay.delay_ms(1);
                self.i2c
                    .write(self.addr, &[reg, value])
                    .map_err(PowerError::I2c)
            }
        }
    }
}
