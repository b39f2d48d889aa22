// Callback bridge tests: registration, replacement, clearing, silence.
use siderite::abi::{
    sdr_buf, sdr_buf_free, sdr_calculator_free, sdr_calculator_new, sdr_calculator_run,
    sdr_context_free, sdr_context_new, sdr_context_set_logger, sdr_error_check, sdr_error_free,
    sdr_error_new, sdr_structure_free, sdr_structure_new,
};
use std::ffi::c_void;
use std::ptr;

unsafe extern "C" fn capture(msg: *const u8, len: usize, user_data: *mut c_void) {
    let seen = unsafe { &mut *(user_data as *mut Vec<Vec<u8>>) };
    let bytes = unsafe { std::slice::from_raw_parts(msg, len) }.to_vec();
    seen.push(bytes);
}

struct Fixture {
    err: *mut siderite::abi::sdr_error,
    ctx: *mut siderite::abi::sdr_context,
    structure: *mut siderite::abi::sdr_structure,
    calc: *mut siderite::abi::sdr_calculator,
}

impl Fixture {
    fn new() -> Self {
        let err = sdr_error_new();
        let ctx = sdr_context_new();
        let numbers = [6i32, 6, 6];
        let positions = [0.0f64, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let structure = sdr_structure_new(err, numbers.as_ptr(), positions.as_ptr(), 3);
        let calc = sdr_calculator_new(err, 1.5);
        assert!(!structure.is_null());
        assert!(!calc.is_null());
        Self {
            err,
            ctx,
            structure,
            calc,
        }
    }

    fn run(&self) {
        let mut buf = sdr_buf {
            data: ptr::null_mut(),
            len: 0,
        };
        let code = sdr_calculator_run(self.err, self.ctx, self.calc, self.structure, &mut buf);
        assert_eq!(code, 0);
        assert_eq!(sdr_error_check(self.err), 0);
        sdr_buf_free(&mut buf);
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        sdr_calculator_free(&mut self.calc);
        sdr_structure_free(&mut self.structure);
        sdr_context_free(&mut self.ctx);
        sdr_error_free(&mut self.err);
    }
}

#[test]
fn logger_receives_exact_message_once() {
    let fixture = Fixture::new();
    let mut seen: Vec<Vec<u8>> = Vec::new();

    let code = sdr_context_set_logger(
        fixture.err,
        fixture.ctx,
        Some(capture),
        (&raw mut seen).cast::<c_void>(),
    );
    assert_eq!(code, 0);

    fixture.run();

    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], b"evaluated 3 pairs, 2 within cutoff");
}

#[test]
fn null_logger_clears_registration() {
    let fixture = Fixture::new();
    let mut seen: Vec<Vec<u8>> = Vec::new();

    sdr_context_set_logger(
        fixture.err,
        fixture.ctx,
        Some(capture),
        (&raw mut seen).cast::<c_void>(),
    );
    fixture.run();
    assert_eq!(seen.len(), 1);

    // Clearing is pure removal, not an error, and stops further dispatch.
    let code = sdr_context_set_logger(fixture.err, fixture.ctx, None, ptr::null_mut());
    assert_eq!(code, 0);
    assert_eq!(sdr_error_check(fixture.err), 0);

    fixture.run();
    assert_eq!(seen.len(), 1);
}

#[test]
fn replacing_logger_redirects_messages() {
    let fixture = Fixture::new();
    let mut first: Vec<Vec<u8>> = Vec::new();
    let mut second: Vec<Vec<u8>> = Vec::new();

    sdr_context_set_logger(
        fixture.err,
        fixture.ctx,
        Some(capture),
        (&raw mut first).cast::<c_void>(),
    );
    sdr_context_set_logger(
        fixture.err,
        fixture.ctx,
        Some(capture),
        (&raw mut second).cast::<c_void>(),
    );

    fixture.run();

    assert_eq!(first.len(), 0);
    assert_eq!(second.len(), 1);
}

#[test]
fn unregistered_context_discards_diagnostics() {
    let fixture = Fixture::new();
    // Never registered: the run still succeeds and produces its result.
    fixture.run();
}
