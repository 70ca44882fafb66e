//! Minimal rust wrapper for the parts of the Measurement Computing
//! Universal Library (UL) the streaming core needs.
//!
//! ## Overview
//!
//! The core of this module is the [`UlBoard`] struct which represents one
//! UL board number (assigned in InstaCal or by config functions). It
//! implements [`BoardPort`] by mapping each primitive operation onto the
//! corresponding UL C-function: `cbDConfigPort`, `cbAOutScan`, `cbCIn32`,
//! `cbDOut` and `cbAOut`.
//!
//! ## Safety and Error Handling
//!
//! All driver calls go through [`ul_call`], which checks the returned status
//! code, retrieves the driver's message with `cbGetErrMsg` on failure, logs
//! it, and surfaces it as a [`PortError`]. Unlike a task-handle API there is
//! no per-call resource to release; the board number is just an index into
//! driver state, so `UlBoard` needs no `Drop` behavior.
//!
//! ## Availability
//!
//! Compiled only with the `mcculw` cargo feature, which links against the
//! vendor `cbw` library. Everything else in this crate builds and tests
//! without the driver installed by substituting another [`BoardPort`]
//! implementation.

use libc::{c_char, c_int, c_long, c_ulong};

use crate::port::{BoardPort, CounterId, PortDirection, PortError, PortId};
use mcseq_backend::{AnalogBlock, DigitalWord};

pub const UL_NOERRORS: c_int = 0;
pub const UL_DIGITALOUT: c_int = 1;
pub const UL_DIGITALIN: c_int = 2;
pub const UL_SIMULTANEOUS: c_int = 0x2000;
pub const UL_LOADREG1: c_int = 1;
pub const UL_UNI10VOLTS: c_int = 100;
pub const UL_ERRSTRLEN: usize = 256;

#[link(name = "cbw64")]
extern "C" {
    fn cbGetErrMsg(err_code: c_int, err_msg: *mut c_char) -> c_int;
    fn cbDConfigPort(board_num: c_int, port_num: c_int, direction: c_int) -> c_int;
    fn cbDOut(board_num: c_int, port_num: c_int, data_value: u16) -> c_int;
    fn cbAOut(board_num: c_int, chan: c_int, range: c_int, data_value: u16) -> c_int;
    // The Python shim this replaces passed sample arrays by pointer rather
    // than through cbWinBufAlloc handles; kept that convention here.
    fn cbAOutScan(
        board_num: c_int,
        low_chan: c_int,
        high_chan: c_int,
        count: c_long,
        rate: *mut c_long,
        range: c_int,
        data: *const u16,
        options: c_int,
    ) -> c_int;
    fn cbCIn32(board_num: c_int, counter_num: c_int, count: *mut c_ulong) -> c_int;
    fn cbCLoad32(board_num: c_int, reg_num: c_int, load_value: c_ulong) -> c_int;
}

/// Calls a UL C-function and converts a nonzero status code into a
/// [`PortError`] carrying the driver's own error message.
pub fn ul_call<F: FnOnce() -> c_int>(context: &'static str, func: F) -> Result<(), PortError> {
    let err_code = func();
    if err_code == UL_NOERRORS {
        return Ok(());
    }
    let mut err_buff = [0 as c_char; UL_ERRSTRLEN];
    unsafe {
        cbGetErrMsg(err_code, err_buff.as_mut_ptr());
    }
    let msg = unsafe { std::ffi::CStr::from_ptr(err_buff.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let err = PortError::new(err_code, context, msg);
    log::error!("{}", err);
    Err(err)
}

/// One Universal Library board, identified by its InstaCal board number.
///
/// The output range cannot be set per-call on the USB-3114 (it is fixed in
/// InstaCal), but UL still wants the range constant on every analog write.
pub struct UlBoard {
    board_num: c_int,
    range: c_int,
}

impl UlBoard {
    pub fn new(board_num: i32) -> Self {
        Self {
            board_num,
            range: UL_UNI10VOLTS,
        }
    }

    /// Zeroes the step counter so counter values correspond 1:1 to step
    /// ordinals starting at 0. Board setup, called once before a run is
    /// handed to the scheduler.
    pub fn reset_counter(&mut self, counter: CounterId) -> Result<(), PortError> {
        ul_call("counter load", || unsafe {
            cbCLoad32(self.board_num, UL_LOADREG1 + counter.0 as c_int - 1, 0)
        })
    }
}

impl BoardPort for UlBoard {
    fn configure_port_direction(
        &mut self,
        port: PortId,
        direction: PortDirection,
    ) -> Result<(), PortError> {
        let dir = match direction {
            PortDirection::Input => UL_DIGITALIN,
            PortDirection::Output => UL_DIGITALOUT,
        };
        ul_call("digital port config", || unsafe {
            cbDConfigPort(self.board_num, port.0 as c_int, dir)
        })
    }

    fn arm_analog_block(
        &mut self,
        low_chan: u32,
        high_chan: u32,
        block: &AnalogBlock,
    ) -> Result<(), PortError> {
        // Rate can't be set for this board; SIMULTANEOUS holds the samples
        // until the next step boundary clocks them out together.
        let mut rate: c_long = 0;
        let samples = block.samples().as_slice().expect("Analog block is contiguous");
        ul_call("analog block arm", || unsafe {
            cbAOutScan(
                self.board_num,
                low_chan as c_int,
                high_chan as c_int,
                samples.len() as c_long,
                &mut rate,
                self.range,
                samples.as_ptr(),
                UL_SIMULTANEOUS,
            )
        })
    }

    fn read_counter(&mut self, counter: CounterId) -> Result<u32, PortError> {
        let mut count: c_ulong = 0;
        ul_call("counter read", || unsafe {
            cbCIn32(self.board_num, counter.0 as c_int, &mut count)
        })?;
        Ok(count as u32)
    }

    fn write_digital(&mut self, port: PortId, word: DigitalWord) -> Result<(), PortError> {
        ul_call("digital write", || unsafe {
            cbDOut(self.board_num, port.0 as c_int, word.bits())
        })
    }

    fn write_analog_channel(&mut self, chan: u32, raw: u16) -> Result<(), PortError> {
        ul_call("analog channel write", || unsafe {
            cbAOut(self.board_num, chan as c_int, self.range, raw)
        })
    }
}
