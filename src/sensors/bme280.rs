//! BME280 pressure/temperature/humidity driver.
//!
//! Only what the daemon needs: chip detection, calibration readout, normal-mode
//! setup and the Bosch integer compensation, which yields the fixed-point
//! encodings carried in [`RawReadings`](super::RawReadings).

use embedded_hal::i2c::I2c;

use super::SensorError;

pub const ADDRESS: u8 = 0x76;

const CHIP: &str = "bme280";
const CHIP_ID: u8 = 0x60;

const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIB_00: u8 = 0x88;
const REG_CALIB_26: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7;

// Oversampling x1 everywhere, normal mode, 1000 ms standby, filter off
const CTRL_HUM_X1: u8 = 0x01;
const CTRL_MEAS_NORMAL_X1: u8 = 0x27;
const CONFIG_STANDBY_1000MS: u8 = 0xA0;

/// Factory trimming parameters read from the chip's NVM.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Decode the two NVM blocks (0x88..=0xA1 and 0xE1..=0xE7).
    pub fn from_registers(block1: &[u8; 26], block2: &[u8; 7]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([block1[i], block1[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([block1[i], block1[i + 1]]);

        Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            h1: block1[25],
            h2: i16::from_le_bytes([block2[0], block2[1]]),
            h3: block2[2],
            // H4 and H5 share the nibbles of 0xE5
            h4: (i16::from(block2[3] as i8) << 4) | i16::from(block2[4] & 0x0F),
            h5: (i16::from(block2[5] as i8) << 4) | i16::from(block2[4] >> 4),
            h6: block2[6] as i8,
        }
    }
}

/// Uncompensated ADC words from one burst read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcSample {
    pub pressure: i32,
    pub temperature: i32,
    pub humidity: i32,
}

impl AdcSample {
    pub fn from_registers(data: &[u8; 8]) -> Self {
        let twenty_bit = |msb: u8, lsb: u8, xlsb: u8| {
            (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
        };
        Self {
            pressure: twenty_bit(data[0], data[1], data[2]),
            temperature: twenty_bit(data[3], data[4], data[5]),
            humidity: (i32::from(data[6]) << 8) | i32::from(data[7]),
        }
    }
}

/// Compensated output in the chip's fixed-point units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Hundredths of a hPa (Pa).
    pub pressure: u32,
    /// Hundredths of a degree Celsius.
    pub temperature: i32,
    /// 1/1024ths of a percent relative humidity.
    pub humidity: u32,
}

/// Apply the datasheet's 32-bit integer compensation formulas.
pub fn compensate(cal: &Calibration, adc: AdcSample) -> Measurement {
    let t1 = i64::from(cal.t1);
    let adc_t = i64::from(adc.temperature);

    let var1 = (((adc_t >> 3) - (t1 << 1)) * i64::from(cal.t2)) >> 11;
    let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * i64::from(cal.t3)) >> 14;
    let t_fine = var1 + var2;
    let temperature = ((t_fine * 5 + 128) >> 8) as i32;

    Measurement {
        pressure: compensate_pressure(cal, adc.pressure, t_fine),
        temperature,
        humidity: compensate_humidity(cal, adc.humidity, t_fine),
    }
}

fn compensate_pressure(cal: &Calibration, adc_p: i32, t_fine: i64) -> u32 {
    let mut var1 = (t_fine >> 1) - 64000;
    let mut var2 = (((var1 >> 2) * (var1 >> 2)) >> 11) * i64::from(cal.p6);
    var2 += (var1 * i64::from(cal.p5)) << 1;
    var2 = (var2 >> 2) + (i64::from(cal.p4) << 16);
    var1 = (((i64::from(cal.p3) * (((var1 >> 2) * (var1 >> 2)) >> 13)) >> 3)
        + ((i64::from(cal.p2) * var1) >> 1))
        >> 18;
    var1 = ((32768 + var1) * i64::from(cal.p1)) >> 15;
    if var1 == 0 {
        // avoid division by zero on an unprogrammed chip
        return 0;
    }

    let mut p = ((1_048_576 - i64::from(adc_p)) - (var2 >> 12)) * 3125;
    if p < 0x8000_0000 {
        p = (p << 1) / var1;
    } else {
        p = (p / var1) * 2;
    }
    let var1 = (i64::from(cal.p9) * (((p >> 3) * (p >> 3)) >> 13)) >> 12;
    let var2 = ((p >> 2) * i64::from(cal.p8)) >> 13;
    let p = p + ((var1 + var2 + i64::from(cal.p7)) >> 4);

    p.clamp(0, i64::from(u32::MAX)) as u32
}

fn compensate_humidity(cal: &Calibration, adc_h: i32, t_fine: i64) -> u32 {
    let adc_h = i64::from(adc_h);
    let mut v = t_fine - 76800;
    v = ((((adc_h << 14) - (i64::from(cal.h4) << 20) - (i64::from(cal.h5) * v)) + 16384) >> 15)
        * (((((((v * i64::from(cal.h6)) >> 10)
            * (((v * i64::from(cal.h3)) >> 11) + 32768))
            >> 10)
            + 2_097_152)
            * i64::from(cal.h2)
            + 8192)
            >> 14);
    v -= ((((v >> 15) * (v >> 15)) >> 7) * i64::from(cal.h1)) >> 4;
    (v.clamp(0, 419_430_400) >> 12) as u32
}

/// BME280 on an I2C bus.
pub struct Bme280<I> {
    i2c: I,
    address: u8,
    calibration: Calibration,
}

impl<I: I2c> Bme280<I> {
    /// Detect the chip, read its calibration and start continuous measurement.
    pub fn new(i2c: I) -> Result<Self, SensorError> {
        Self::with_address(i2c, ADDRESS)
    }

    pub fn with_address(i2c: I, address: u8) -> Result<Self, SensorError> {
        let mut sensor = Self {
            i2c,
            address,
            calibration: Calibration::default(),
        };

        let mut id = [0u8; 1];
        sensor.read_registers(REG_CHIP_ID, &mut id)?;
        if id[0] != CHIP_ID {
            return Err(SensorError::ChipId {
                chip: CHIP,
                expected: CHIP_ID,
                found: id[0],
            });
        }

        let mut block1 = [0u8; 26];
        let mut block2 = [0u8; 7];
        sensor.read_registers(REG_CALIB_00, &mut block1)?;
        sensor.read_registers(REG_CALIB_26, &mut block2)?;
        sensor.calibration = Calibration::from_registers(&block1, &block2);

        // ctrl_hum only takes effect after a ctrl_meas write
        sensor.write_register(REG_CTRL_HUM, CTRL_HUM_X1)?;
        sensor.write_register(REG_CONFIG, CONFIG_STANDBY_1000MS)?;
        sensor.write_register(REG_CTRL_MEAS, CTRL_MEAS_NORMAL_X1)?;

        Ok(sensor)
    }

    /// Read pressure, temperature and humidity in one burst.
    pub fn read_pressure_temperature_humidity(&mut self) -> Result<Measurement, SensorError> {
        let mut data = [0u8; 8];
        self.read_registers(REG_DATA, &mut data)?;
        Ok(compensate(&self.calibration, AdcSample::from_registers(&data)))
    }

    /// Give the bus handle back.
    pub fn release(self) -> I {
        self.i2c
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
