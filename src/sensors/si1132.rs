//! SI1132 UV index / ambient light driver.
//!
//! The chip is put into autonomous ALS mode at start; each read just fetches the
//! latest result registers. Visible and IR counts are turned into lux with the
//! weather board's dark offsets and gains.

use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;

use super::SensorError;

pub const ADDRESS: u8 = 0x60;

const CHIP: &str = "si1132";
const PART_ID: u8 = 0x32;

const REG_PART_ID: u8 = 0x00;
const REG_INT_CFG: u8 = 0x03;
const REG_IRQ_ENABLE: u8 = 0x04;
const REG_IRQ_MODE1: u8 = 0x05;
const REG_IRQ_MODE2: u8 = 0x06;
const REG_HW_KEY: u8 = 0x07;
const REG_MEAS_RATE0: u8 = 0x08;
const REG_MEAS_RATE1: u8 = 0x09;
const REG_UCOEF0: u8 = 0x13;
const REG_PARAM_WR: u8 = 0x17;
const REG_COMMAND: u8 = 0x18;
const REG_IRQ_STATUS: u8 = 0x21;
const REG_ALS_VIS_DATA0: u8 = 0x22;
const REG_ALS_IR_DATA0: u8 = 0x24;
const REG_AUX_DATA0: u8 = 0x2C;

const CMD_RESET: u8 = 0x01;
const CMD_ALS_AUTO: u8 = 0x0E;
const CMD_PARAM_SET: u8 = 0xA0;

const HW_KEY: u8 = 0x17;
const PARAM_CHLIST: u8 = 0x01;
// UV, AUX, ALS IR and ALS visible channels
const CHLIST_ALL: u8 = 0xF0;
const UCOEF: [u8; 4] = [0x7B, 0x6B, 0x01, 0x00];

const VISIBLE_DARK_OFFSET: f64 = 256.0;
const VISIBLE_SENSITIVITY: f64 = 0.282;
const IR_DARK_OFFSET: f64 = 250.0;
const IR_SENSITIVITY: f64 = 2.44;
const LUX_GAIN: f64 = 14.5;

const RESET_SETTLE: Duration = Duration::from_millis(10);

/// Convert a visible-channel ADC count to lux.
pub fn visible_lux(count: u16) -> f64 {
    ((f64::from(count) - VISIBLE_DARK_OFFSET) / VISIBLE_SENSITIVITY * LUX_GAIN).max(0.0)
}

/// Convert an IR-channel ADC count to lux.
pub fn ir_lux(count: u16) -> f64 {
    ((f64::from(count) - IR_DARK_OFFSET) / IR_SENSITIVITY * LUX_GAIN).max(0.0)
}

/// SI1132 on an I2C bus.
pub struct Si1132<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Si1132<I> {
    /// Detect, reset and start autonomous measurement.
    pub fn new(i2c: I) -> Result<Self, SensorError> {
        let mut sensor = Self {
            i2c,
            address: ADDRESS,
        };

        let mut id = [0u8; 1];
        sensor.read_registers(REG_PART_ID, &mut id)?;
        if id[0] != PART_ID {
            return Err(SensorError::ChipId {
                chip: CHIP,
                expected: PART_ID,
                found: id[0],
            });
        }

        sensor.reset()?;

        for (offset, coefficient) in UCOEF.iter().enumerate() {
            sensor.write_register(REG_UCOEF0 + offset as u8, *coefficient)?;
        }
        sensor.write_register(REG_PARAM_WR, CHLIST_ALL)?;
        sensor.write_register(REG_COMMAND, CMD_PARAM_SET | PARAM_CHLIST)?;
        sensor.write_register(REG_MEAS_RATE0, 0xFF)?;
        sensor.write_register(REG_COMMAND, CMD_ALS_AUTO)?;

        Ok(sensor)
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        for register in [
            REG_MEAS_RATE0,
            REG_MEAS_RATE1,
            REG_IRQ_ENABLE,
            REG_IRQ_MODE1,
            REG_IRQ_MODE2,
            REG_INT_CFG,
        ] {
            self.write_register(register, 0x00)?;
        }
        self.write_register(REG_IRQ_STATUS, 0xFF)?;
        self.write_register(REG_COMMAND, CMD_RESET)?;
        thread::sleep(RESET_SETTLE);
        self.write_register(REG_HW_KEY, HW_KEY)?;
        thread::sleep(RESET_SETTLE);
        Ok(())
    }

    /// UV index scaled by 100.
    pub fn read_uv(&mut self) -> Result<u16, SensorError> {
        self.read_u16(REG_AUX_DATA0)
    }

    pub fn read_visible(&mut self) -> Result<f64, SensorError> {
        self.read_u16(REG_ALS_VIS_DATA0).map(visible_lux)
    }

    pub fn read_ir(&mut self) -> Result<f64, SensorError> {
        self.read_u16(REG_ALS_IR_DATA0).map(ir_lux)
    }

    pub fn release(self) -> I {
        self.i2c
    }

    fn read_u16(&mut self, register: u8) -> Result<u16, SensorError> {
        let mut buffer = [0u8; 2];
        self.read_registers(register, &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), SensorError> {
        self.i2c
            .write_read(self.address, &[register], buffer)
            .map_err(|e| SensorError::bus(CHIP, e))
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|e| SensorError::bus(CHIP, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    fn init_transactions() -> Vec<Transaction> {
        let mut t = vec![Transaction::write_read(ADDRESS, vec![REG_PART_ID], vec![PART_ID])];
        for register in [
            REG_MEAS_RATE0,
            REG_MEAS_RATE1,
            REG_IRQ_ENABLE,
            REG_IRQ_MODE1,
            REG_IRQ_MODE2,
            REG_INT_CFG,
        ] {
            t.push(Transaction::write(ADDRESS, vec![register, 0x00]));
        }
        t.push(Transaction::write(ADDRESS, vec![REG_IRQ_STATUS, 0xFF]));
        t.push(Transaction::write(ADDRESS, vec![REG_COMMAND, CMD_RESET]));
        t.push(Transaction::write(ADDRESS, vec![REG_HW_KEY, HW_KEY]));
        for (offset, coefficient) in UCOEF.iter().enumerate() {
            t.push(Transaction::write(
                ADDRESS,
                vec![REG_UCOEF0 + offset as u8, *coefficient],
            ));
        }
        t.push(Transaction::write(ADDRESS, vec![REG_PARAM_WR, CHLIST_ALL]));
        t.push(Transaction::write(
            ADDRESS,
            vec![REG_COMMAND, CMD_PARAM_SET | PARAM_CHLIST],
        ));
        t.push(Transaction::write(ADDRESS, vec![REG_MEAS_RATE0, 0xFF]));
        t.push(Transaction::write(ADDRESS, vec![REG_COMMAND, CMD_ALS_AUTO]));
        t
    }

    #[test]
    fn test_reads_little_endian_result_registers() {
        let mut expectations = init_transactions();
        expectations.push(Transaction::write_read(
            ADDRESS,
            vec![REG_AUX_DATA0],
            vec![0xC2, 0x01],
        ));
        expectations.push(Transaction::write_read(
            ADDRESS,
            vec![REG_ALS_VIS_DATA0],
            vec![0x00, 0x01],
        ));
        let i2c = I2cMock::new(&expectations);

        let mut sensor = Si1132::new(i2c).expect("init succeeds");
        assert_eq!(sensor.read_uv(), Ok(450));
        assert_eq!(sensor.read_visible(), Ok(0.0));
        sensor.release().done();
    }

    #[test]
    fn test_rejects_wrong_part_id() {
        let expectations = [Transaction::write_read(ADDRESS, vec![REG_PART_ID], vec![0x45])];
        let mut i2c = I2cMock::new(&expectations);

        assert!(matches!(
            Si1132::new(i2c.clone()),
            Err(SensorError::ChipId { found: 0x45, .. })
        ));
        i2c.done();
    }

    #[test]
    fn test_counts_below_dark_offset_clamp_to_zero() {
        assert_eq!(visible_lux(100), 0.0);
        assert_eq!(ir_lux(0), 0.0);
    }

    #[test]
    fn test_lux_scales_linearly_above_offset() {
        let lux = ir_lux(250 + 244);
        assert!((lux - 1450.0).abs() < 1e-9);
    }
}
