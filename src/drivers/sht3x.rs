//! Sensirion SHT3x temperature / humidity sensor (I2C).
//!
//! Single-shot, high repeatability, no clock stretching: the sensor NACKs reads until the
//! conversion is done, so the result read is polled with a bounded retry.

use crc::{Crc, CRC_8_NRSC_5};
use embassy_time::Duration;
use embedded_hal::blocking::i2c::{Read, Write};

use super::Sensor;
use crate::data::{DataType, DataUnit};
use crate::error::Error;
use crate::retry::Retry;

pub const DEFAULT_ADDRESS: u8 = 0x44;
pub const ALT_ADDRESS: u8 = 0x45;

const CMD_MEASURE_HIGH_NO_STRETCH: [u8; 2] = [0x24, 0x00];
const CMD_SOFT_RESET: [u8; 2] = [0x30, 0xA2];

// High repeatability conversion takes up to 15.5 ms
const POLL_ATTEMPTS: u8 = 5;
const POLL_DELAY: Duration = Duration::from_millis(4);

// Poly 0x31, init 0xFF, no reflection: the Sensirion checksum
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

/// One sample in fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Hundredths of a degree Celsius.
    pub temperature_centi_c: i32,
    /// Hundredths of a percent relative humidity.
    pub humidity_centi_pct: u32,
}

impl Measurement {
    fn from_raw(t: u16, rh: u16) -> Self {
        Self {
            temperature_centi_c: -4500 + (17500 * t as i32) / 65535,
            humidity_centi_pct: (10000 * rh as u32) / 65535,
        }
    }

    pub fn to_unit(self) -> Result<DataUnit, Error> {
        DataUnit::new(
            DataType::Sht3x,
            &[self.temperature_centi_c as u32, self.humidity_centi_pct],
        )
    }
}

pub struct Sht3x<I2C> {
    i2c: I2C,
    address: u8,
    poll: Retry,
}

impl<I2C, E> Sht3x<I2C>
where
    I2C: Read<Error = E> + Write<Error = E>,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            poll: Retry::new(POLL_ATTEMPTS, POLL_DELAY),
        }
    }

    pub fn with_poll(mut self, poll: Retry) -> Self {
        self.poll = poll;
        self
    }

    pub fn soft_reset(&mut self) -> Result<(), Error> {
        self.i2c
            .write(self.address, &CMD_SOFT_RESET)
            .map_err(|_| Error::Sensor)
    }

    pub async fn measure(&mut self) -> Result<Measurement, Error> {
        self.i2c
            .write(self.address, &CMD_MEASURE_HIGH_NO_STRETCH)
            .map_err(|_| Error::Sensor)?;

        let mut buf = [0u8; 6];
        let (i2c, address) = (&mut self.i2c, self.address);
        self.poll
            .poll(|_| i2c.read(address, &mut buf))
            .await
            .map_err(|_| {
                warn!("sht3x at {} did not answer", address);
                Error::Sensor
            })?;

        let t = checked_word(&buf[0..3])?;
        let rh = checked_word(&buf[3..6])?;
        Ok(Measurement::from_raw(t, rh))
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> Sensor for Sht3x<I2C>
where
    I2C: Read<Error = E> + Write<Error = E>,
{
    const DATA_TYPE: DataType = DataType::Sht3x;

    async fn sample(&mut self) -> Result<DataUnit, Error> {
        self.measure().await?.to_unit()
    }
}

/* ====== helpers ====== */

fn checked_word(chunk: &[u8]) -> Result<u16, Error> {
    if crc8(&chunk[..2]) != chunk[2] {
        warn!("sht3x crc mismatch");
        return Err(Error::Sensor);
    }
    Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
}

fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}
