use embassy_stm32::mode::Async;
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{BufferedUart, Config as UsartConfig};
use embassy_stm32::{
    bind_interrupts,
    gpio::Pull,
    i2c, peripherals, rcc, usart, Config,
};
use static_cell::StaticCell;

use crate::config::{I2C_FREQUENCY_HZ, MODEM_BAUDRATE, SERIAL_BAUDRATE};

// ── IRQ table ─────────────────────────────────────────────
bind_interrupts!(pub struct Irqs {
    USART1 => usart::BufferedInterruptHandler<peripherals::USART1>;
    USART2 => usart::BufferedInterruptHandler<peripherals::USART2>;
    I2C2   => i2c::EventInterruptHandler<peripherals::I2C2>,
              i2c::ErrorInterruptHandler<peripherals::I2C2>;
});

const MODEM_BUF_LEN: usize = 512;
const SERIAL_BUF_LEN: usize = 256;

static MODEM_TX_BUF: StaticCell<[u8; MODEM_BUF_LEN]> = StaticCell::new();
static MODEM_RX_BUF: StaticCell<[u8; MODEM_BUF_LEN]> = StaticCell::new();
static SERIAL_TX_BUF: StaticCell<[u8; SERIAL_BUF_LEN]> = StaticCell::new();
static SERIAL_RX_BUF: StaticCell<[u8; SERIAL_BUF_LEN]> = StaticCell::new();

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    /// Long-range modem (AT commands).
    pub modem_uart: BufferedUart<'static>,
    /// Wired serial output.
    pub serial_uart: BufferedUart<'static>,
    /// SHT3x bus. DMA backed, blocking calls are used by the driver.
    pub i2c2: i2c::I2c<'static, Async>,
}

impl Board {
    /// Brings up clocks and peripherals. Must be called once.
    pub fn init() -> Self {
        let mut config = Config::default();

        // HSI16 -> PLL -> 64 MHz SYSCLK
        config.rcc.hsi = Some(rcc::Hsi {
            sys_div: rcc::HsiSysDiv::DIV1,
        });
        config.rcc.pll = Some(rcc::Pll {
            source: rcc::PllSource::HSI,    // Use HSI as PLL source
            prediv: rcc::PllPreDiv::DIV2,   // 16MHz / 2 = 8MHz
            mul: rcc::PllMul::MUL16,        // 8MHz * 16 = 128MHz
            divp: None,
            divq: None,
            divr: Some(rcc::PllRDiv::DIV2), // 128MHz / 2 = 64MHz
        });
        config.rcc.sys = rcc::Sysclk::PLL1_R;
        let p = embassy_stm32::init(config);

        // USART1: modem on PC4 (TX) / PC5 (RX)
        let mut modem_cfg = UsartConfig::default();
        modem_cfg.baudrate = MODEM_BAUDRATE;
        modem_cfg.rx_pull = Pull::Up;

        let modem_uart = defmt::unwrap!(BufferedUart::new(
            p.USART1,
            Irqs,
            p.PC5,
            p.PC4,
            MODEM_TX_BUF.init([0; MODEM_BUF_LEN]),
            MODEM_RX_BUF.init([0; MODEM_BUF_LEN]),
            modem_cfg,
        ));

        // USART2: wired output on PA2 (TX) / PA3 (RX), the ST-LINK virtual COM port
        let mut serial_cfg = UsartConfig::default();
        serial_cfg.baudrate = SERIAL_BAUDRATE;

        let serial_uart = defmt::unwrap!(BufferedUart::new(
            p.USART2,
            Irqs,
            p.PA3,
            p.PA2,
            SERIAL_TX_BUF.init([0; SERIAL_BUF_LEN]),
            SERIAL_RX_BUF.init([0; SERIAL_BUF_LEN]),
            serial_cfg,
        ));

        // I²C2 (DMA CH7 TX, CH6 RX), external pull-ups on the sensor board
        let mut i2c_cfg = i2c::Config::default();
        i2c_cfg.sda_pullup = false;
        i2c_cfg.scl_pullup = false;

        let i2c2 = i2c::I2c::new(
            p.I2C2,
            p.PB10,
            p.PB11,
            Irqs,
            p.DMA1_CH7,
            p.DMA1_CH6,
            Hertz(I2C_FREQUENCY_HZ),
            i2c_cfg,
        );

        Self {
            modem_uart,
            serial_uart,
            i2c2,
        }
    }
}
