//! Purpose: Stable `sdr_` C ABI over the siderite core (libsiderite).
//! Exports: error-channel, context, structure, calculator, and buffer symbols.
//! Role: The only boundary layer; translates every internal failure into the error channel.
//! Invariants: Opaque handles carry a kind tag at offset 0, checked before every use.
//! Invariants: Destructors take the handle slot by reference and null it; double free is a no-op.
//! Invariants: Nothing unwinds across the boundary; panics become Internal channel reports.
//! Notes: Every symbol below was introduced in ABI v0.1.0.
#![allow(non_camel_case_types)]

use crate::core::calc::Calculator;
use crate::core::context::Context;
use crate::core::error::{kind_code, Error, ErrorKind};
use crate::core::structure::Structure;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

pub const SDR_ABI_VERSION_MAJOR: u32 = 0;
pub const SDR_ABI_VERSION_MINOR: u32 = 1;
pub const SDR_ABI_VERSION_PATCH: u32 = 0;

// Kind tags live at offset 0 of every handle allocation ("SDR" + kind byte).
const TAG_ERROR: u32 = 0x5344_5201;
const TAG_CONTEXT: u32 = 0x5344_5202;
const TAG_STRUCTURE: u32 = 0x5344_5203;
const TAG_CALCULATOR: u32 = 0x5344_5204;

#[repr(C)]
pub struct sdr_error {
    tag: u32,
    state: Option<Error>,
}

#[repr(C)]
pub struct sdr_context {
    tag: u32,
    ctx: Context,
}

#[repr(C)]
pub struct sdr_structure {
    tag: u32,
    structure: Structure,
}

#[repr(C)]
pub struct sdr_calculator {
    tag: u32,
    calc: Calculator,
}

#[repr(C)]
pub struct sdr_buf {
    pub data: *mut u8,
    pub len: usize,
}

/// Logger callback. Receives length-delimited bytes that are not
/// NUL-terminated; implementations must respect `len` and never scan for a
/// terminator. The user-data pointer is borrowed for the call only.
pub type sdr_logger_fn =
    Option<unsafe extern "C" fn(msg: *const u8, len: usize, user_data: *mut c_void)>;

/// Returns the packed ABI version, `major << 16 | minor << 8 | patch`.
/// Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_api_version() -> u32 {
    (SDR_ABI_VERSION_MAJOR << 16) | (SDR_ABI_VERSION_MINOR << 8) | SDR_ABI_VERSION_PATCH
}

/// Allocates an error channel handle in the ok state. Never reports failure;
/// allocation failure here aborts the process since no channel exists yet to
/// report through. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_error_new() -> *mut sdr_error {
    Box::into_raw(Box::new(sdr_error {
        tag: TAG_ERROR,
        state: None,
    }))
}

/// Frees the handle and nulls the caller's slot. Safe on a null slot and on
/// an already-nulled handle. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_error_free(slot: *mut *mut sdr_error) {
    release(slot, TAG_ERROR);
}

/// Returns 1 when the channel holds an error, 0 when it is ok. A null or
/// mistagged handle counts as an error state. Never mutates. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_error_check(err: *const sdr_error) -> c_int {
    if err.is_null() {
        return 1;
    }
    let handle = unsafe { &*err };
    if handle.tag != TAG_ERROR {
        return 1;
    }
    c_int::from(handle.state.is_some())
}

/// Resets the channel to the ok state so one handle can serve a chain of
/// operations. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_error_clear(err: *mut sdr_error) {
    if err.is_null() {
        return;
    }
    let handle = unsafe { &mut *err };
    if handle.tag != TAG_ERROR {
        return;
    }
    handle.state = None;
}

/// Copies up to `capacity` bytes of the stored message into `buffer` without
/// overrun and returns the full message length, so callers can detect
/// truncation. Output is length-delimited, never NUL-terminated. Returns 0
/// when the channel is ok, null, or mistagged. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_error_get_message(
    err: *const sdr_error,
    buffer: *mut u8,
    capacity: usize,
) -> usize {
    if err.is_null() {
        return 0;
    }
    let handle = unsafe { &*err };
    if handle.tag != TAG_ERROR {
        return 0;
    }
    let Some(state) = &handle.state else {
        return 0;
    };
    let message = state.to_string();
    let bytes = message.as_bytes();
    if !buffer.is_null() && capacity > 0 {
        let n = bytes.len().min(capacity);
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, n);
        }
    }
    bytes.len()
}

/// Allocates a diagnostic context with no logger registered. Never reports
/// failure. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_context_new() -> *mut sdr_context {
    Box::into_raw(Box::new(sdr_context {
        tag: TAG_CONTEXT,
        ctx: Context::new(),
    }))
}

/// Frees the handle and nulls the caller's slot; drops any registered logger.
/// Safe on a null slot and on an already-nulled handle. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_context_free(slot: *mut *mut sdr_context) {
    release(slot, TAG_CONTEXT);
}

/// Replaces the context's logger registration. The previous registration is
/// dropped before the new one is installed. A null `callback` clears the
/// registration; diagnostics are then discarded. The library borrows
/// `user_data` for the duration of each invocation and never frees it.
/// Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_context_set_logger(
    err: *mut sdr_error,
    ctx: *mut sdr_context,
    callback: sdr_logger_fn,
    user_data: *mut c_void,
) -> c_int {
    guard_status(err, || {
        let handle = match borrow_context(err, ctx) {
            Ok(handle) => handle,
            Err(code) => return code,
        };
        match callback {
            Some(func) => {
                let data = user_data as usize;
                handle.ctx.set_sink(Some(Box::new(move |bytes: &[u8]| unsafe {
                    func(bytes.as_ptr(), bytes.len(), data as *mut c_void)
                })));
            }
            None => handle.ctx.set_sink(None),
        }
        0
    })
}

/// Builds a structure from `natoms` species numbers and `3 * natoms` packed
/// coordinates. Returns null and records the failure in `err` when the
/// arguments are invalid. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_structure_new(
    err: *mut sdr_error,
    numbers: *const i32,
    positions: *const f64,
    natoms: i64,
) -> *mut sdr_structure {
    guard_ptr(err, || {
        let positions = match read_positions(positions, natoms, "structure_new") {
            Ok(positions) => positions,
            Err(error) => {
                fail(err, error);
                return ptr::null_mut();
            }
        };
        if numbers.is_null() {
            fail(
                err,
                Error::new(ErrorKind::Usage)
                    .with_message("numbers is null")
                    .with_operation("structure_new"),
            );
            return ptr::null_mut();
        }
        let numbers = unsafe { slice::from_raw_parts(numbers, positions.len()) }.to_vec();
        match Structure::new(numbers, positions) {
            Ok(structure) => Box::into_raw(Box::new(sdr_structure {
                tag: TAG_STRUCTURE,
                structure,
            })),
            Err(error) => {
                fail(err, error);
                ptr::null_mut()
            }
        }
    })
}

/// Frees the handle and nulls the caller's slot. Safe on a null slot and on
/// an already-nulled handle. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_structure_free(slot: *mut *mut sdr_structure) {
    release(slot, TAG_STRUCTURE);
}

/// Returns the particle count, or -1 after recording a failure in `err`.
/// Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_structure_count(err: *mut sdr_error, structure: *mut sdr_structure) -> i64 {
    match borrow_structure(err, structure) {
        Ok(handle) => handle.structure.len() as i64,
        Err(_) => -1,
    }
}

/// Replaces all coordinates; `natoms` must match the count fixed at
/// construction. On failure the structure keeps its last good state.
/// Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_structure_update_positions(
    err: *mut sdr_error,
    structure: *mut sdr_structure,
    positions: *const f64,
    natoms: i64,
) -> c_int {
    guard_status(err, || {
        let handle = match borrow_structure(err, structure) {
            Ok(handle) => handle,
            Err(code) => return code,
        };
        let positions = match read_positions(positions, natoms, "structure_update_positions") {
            Ok(positions) => positions,
            Err(error) => return fail(err, error),
        };
        match handle.structure.update_positions(positions) {
            Ok(()) => 0,
            Err(error) => fail(err, error),
        }
    })
}

/// Serializes the structure as JSON into `out_buf`; the caller releases the
/// buffer with `sdr_buf_free`. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_structure_to_json(
    err: *mut sdr_error,
    structure: *mut sdr_structure,
    out_buf: *mut sdr_buf,
) -> c_int {
    guard_status(err, || {
        let handle = match borrow_structure(err, structure) {
            Ok(handle) => handle,
            Err(code) => return code,
        };
        let bytes = match handle.structure.to_json() {
            Ok(bytes) => bytes,
            Err(error) => return fail(err, error),
        };
        match write_buf(out_buf, bytes) {
            Ok(()) => 0,
            Err(error) => fail(err, error),
        }
    })
}

/// Builds a pair-geometry calculator. The cutoff must be finite and positive;
/// otherwise returns null and records the failure in `err`. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_calculator_new(err: *mut sdr_error, cutoff: f64) -> *mut sdr_calculator {
    guard_ptr(err, || match Calculator::new(cutoff) {
        Ok(calc) => Box::into_raw(Box::new(sdr_calculator {
            tag: TAG_CALCULATOR,
            calc,
        })),
        Err(error) => {
            fail(err, error);
            ptr::null_mut()
        }
    })
}

/// Frees the handle and nulls the caller's slot. Safe on a null slot and on
/// an already-nulled handle. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_calculator_free(slot: *mut *mut sdr_calculator) {
    release(slot, TAG_CALCULATOR);
}

/// Evaluates the pair summary for `structure`, emits one diagnostic line
/// through the context's logger, and writes the JSON summary into `out_buf`.
/// The callback runs synchronously on the calling thread and must not call
/// back into this context's mutating operations. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_calculator_run(
    err: *mut sdr_error,
    ctx: *mut sdr_context,
    calc: *mut sdr_calculator,
    structure: *mut sdr_structure,
    out_buf: *mut sdr_buf,
) -> c_int {
    guard_status(err, || {
        let ctx = match borrow_context(err, ctx) {
            Ok(handle) => handle,
            Err(code) => return code,
        };
        let calc = match borrow_calculator(err, calc) {
            Ok(handle) => handle,
            Err(code) => return code,
        };
        let structure = match borrow_structure(err, structure) {
            Ok(handle) => handle,
            Err(code) => return code,
        };
        let summary = match calc.calc.run(&ctx.ctx, &structure.structure) {
            Ok(summary) => summary,
            Err(error) => return fail(err, error),
        };
        let bytes = match summary.to_json() {
            Ok(bytes) => bytes,
            Err(error) => return fail(err, error),
        };
        match write_buf(out_buf, bytes) {
            Ok(()) => 0,
            Err(error) => fail(err, error),
        }
    })
}

/// Frees the contents of a buffer produced by this library and nulls its
/// fields. Safe to call on a null or already-freed buffer. Since v0.1.0.
#[unsafe(no_mangle)]
pub extern "C" fn sdr_buf_free(buf: *mut sdr_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() && buf.len != 0 {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
        }
        buf.data = ptr::null_mut();
        buf.len = 0;
    }
}

// Shared destructor body: tag-checked, by-reference, nulling, idempotent.
// A mistagged pointer is left untouched; leaking beats freeing as the wrong
// type when the caller has already broken the contract.
fn release<T>(slot: *mut *mut T, tag: u32) {
    if slot.is_null() {
        return;
    }
    unsafe {
        let handle = *slot;
        if handle.is_null() {
            return;
        }
        if *(handle as *const u32) != tag {
            tracing::debug!(target: "siderite::abi", "refusing to free mistagged handle");
            return;
        }
        let _ = panic::catch_unwind(AssertUnwindSafe(|| drop(Box::from_raw(handle))));
        *slot = ptr::null_mut();
    }
}

fn borrow_context<'a>(
    err: *mut sdr_error,
    ctx: *mut sdr_context,
) -> Result<&'a mut sdr_context, c_int> {
    if ctx.is_null() {
        return Err(fail(
            err,
            Error::new(ErrorKind::Usage).with_message("context handle is null"),
        ));
    }
    let handle = unsafe { &mut *ctx };
    if handle.tag != TAG_CONTEXT {
        return Err(fail(
            err,
            Error::new(ErrorKind::Usage).with_message("handle kind mismatch: expected context"),
        ));
    }
    Ok(handle)
}

fn borrow_structure<'a>(
    err: *mut sdr_error,
    structure: *mut sdr_structure,
) -> Result<&'a mut sdr_structure, c_int> {
    if structure.is_null() {
        return Err(fail(
            err,
            Error::new(ErrorKind::Usage).with_message("structure handle is null"),
        ));
    }
    let handle = unsafe { &mut *structure };
    if handle.tag != TAG_STRUCTURE {
        return Err(fail(
            err,
            Error::new(ErrorKind::Usage).with_message("handle kind mismatch: expected structure"),
        ));
    }
    Ok(handle)
}

fn borrow_calculator<'a>(
    err: *mut sdr_error,
    calc: *mut sdr_calculator,
) -> Result<&'a mut sdr_calculator, c_int> {
    if calc.is_null() {
        return Err(fail(
            err,
            Error::new(ErrorKind::Usage).with_message("calculator handle is null"),
        ));
    }
    let handle = unsafe { &mut *calc };
    if handle.tag != TAG_CALCULATOR {
        return Err(fail(
            err,
            Error::new(ErrorKind::Usage).with_message("handle kind mismatch: expected calculator"),
        ));
    }
    Ok(handle)
}

fn read_positions(
    positions: *const f64,
    natoms: i64,
    operation: &'static str,
) -> Result<Vec<[f64; 3]>, Error> {
    if natoms <= 0 {
        return Err(Error::new(ErrorKind::Validation)
            .with_message(format!("particle count must be positive, got {natoms}"))
            .with_operation(operation));
    }
    if positions.is_null() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("positions is null")
            .with_operation(operation));
    }
    let count = natoms as usize;
    let len = count.checked_mul(3).ok_or_else(|| {
        Error::new(ErrorKind::Validation)
            .with_message(format!("particle count {natoms} is out of range"))
            .with_operation(operation)
    })?;
    let flat = unsafe { slice::from_raw_parts(positions, len) };
    Ok(flat
        .chunks_exact(3)
        .map(|triple| [triple[0], triple[1], triple[2]])
        .collect())
}

fn write_buf(out_buf: *mut sdr_buf, bytes: Vec<u8>) -> Result<(), Error> {
    if out_buf.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message("out_buf is null"));
    }
    unsafe {
        let buf = &mut *out_buf;
        let mut data = bytes.into_boxed_slice();
        buf.len = data.len();
        buf.data = data.as_mut_ptr();
        std::mem::forget(data);
    }
    Ok(())
}

// The single path from internal errors into the foreign-visible channel.
fn fail(err: *mut sdr_error, error: Error) -> c_int {
    let code = kind_code(error.kind());
    tracing::debug!(target: "siderite::abi", %error, "operation failed");
    if err.is_null() {
        return code;
    }
    let slot = unsafe { &mut *err };
    if slot.tag == TAG_ERROR {
        slot.state = Some(error);
    }
    code
}

fn guard_status<F>(err: *mut sdr_error, op: F) -> c_int
where
    F: FnOnce() -> c_int,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(code) => code,
        Err(_) => fail(
            err,
            Error::new(ErrorKind::Internal).with_message("panic caught at ABI boundary"),
        ),
    }
}

fn guard_ptr<T, F>(err: *mut sdr_error, op: F) -> *mut T
where
    F: FnOnce() -> *mut T,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(handle) => handle,
        Err(_) => {
            fail(
                err,
                Error::new(ErrorKind::Internal).with_message("panic caught at ABI boundary"),
            );
            ptr::null_mut()
        }
    }
}
