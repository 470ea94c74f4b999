//! C bindings for the grokhtml engine.
//!
//! Every object lives in a caller-owned [`GrokContext`]; machines and
//! documents are referred to by opaque non-zero `uint64_t` handles. Handle
//! `0` is returned on failure and freeing it (or any stale handle) is a
//! no-op. Failures fill the optional [`GrokError`] out-parameter.
//!
//! A context must not be used from two threads at once.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use grok_engine::{DocumentHandle, Error, ErrorKind, MachineHandle, Registry};

pub const GROK_OK: i32 = 0;
pub const GROK_ERR_PARSE: i32 = 1;
pub const GROK_ERR_DOCUMENT: i32 = 2;
pub const GROK_ERR_RUNTIME: i32 = 3;
pub const GROK_ERR_RANGE: i32 = 4;
pub const GROK_ERR_ALLOCATION: i32 = 5;

/// Owner of every machine and document created through it.
pub struct GrokContext {
    registry: Registry,
}

/// Error details. `message` is owned by the library; release it with
/// [`grok_error_clear`]. `offset` is the expression byte offset for parse
/// errors and -1 otherwise.
#[repr(C)]
#[derive(Debug)]
pub struct GrokError {
    pub kind: i32,
    pub offset: i64,
    pub message: *mut c_char,
}

fn kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Parse => GROK_ERR_PARSE,
        ErrorKind::Document => GROK_ERR_DOCUMENT,
        ErrorKind::Runtime => GROK_ERR_RUNTIME,
        ErrorKind::Range => GROK_ERR_RANGE,
        ErrorKind::Allocation => GROK_ERR_ALLOCATION,
    }
}

/// Write `error` into `out`, replacing any message already there.
unsafe fn report(out: *mut GrokError, error: &Error) {
    tracing::debug!(%error, "grok call failed");
    let Some(out) = out.as_mut() else {
        return;
    };
    clear(out);
    out.kind = kind_code(error.kind());
    out.offset = error
        .offset()
        .and_then(|o| i64::try_from(o).ok())
        .unwrap_or(-1);
    // Messages never contain NUL, but fall back to an empty string rather than fail.
    out.message = CString::new(error.to_string())
        .unwrap_or_default()
        .into_raw();
}

fn clear(out: &mut GrokError) {
    if !out.message.is_null() {
        // SAFETY: non-null messages are only ever produced by `CString::into_raw`.
        drop(unsafe { CString::from_raw(out.message) });
    }
    out.kind = GROK_OK;
    out.offset = -1;
    out.message = ptr::null_mut();
}

/// Borrow a NUL-terminated UTF-8 argument.
unsafe fn utf8_arg<'a>(
    arg: *const c_char,
    name: &str,
    on_invalid: impl FnOnce(usize) -> Error,
) -> Result<&'a str, Error> {
    if arg.is_null() {
        return Err(Error::Runtime(format!("{name} is a null pointer")));
    }
    let bytes = CStr::from_ptr(arg).to_bytes();
    std::str::from_utf8(bytes).map_err(|e| on_invalid(e.valid_up_to()))
}

unsafe fn context<'a>(ctx: *mut GrokContext) -> Result<&'a mut GrokContext, Error> {
    ctx.as_mut()
        .ok_or_else(|| Error::Runtime("context is a null pointer".into()))
}

/// Create a context. Release it with [`grok_context_free`].
#[no_mangle]
pub extern "C" fn grok_context_new() -> *mut GrokContext {
    Box::into_raw(Box::new(GrokContext {
        registry: Registry::new(),
    }))
}

/// Release a context and every machine and document it still owns.
///
/// # Safety
/// `ctx` must be null or a pointer from [`grok_context_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn grok_context_free(ctx: *mut GrokContext) {
    if !ctx.is_null() {
        drop(Box::from_raw(ctx));
    }
}

/// Compile a tree expression. Returns 0 on failure.
///
/// # Safety
/// `ctx` must be a live context, `expr` a NUL-terminated string, and `err`
/// null or a valid `GrokError`.
#[no_mangle]
pub unsafe extern "C" fn grok_compile_expression(
    ctx: *mut GrokContext,
    expr: *const c_char,
    err: *mut GrokError,
) -> u64 {
    let result = context(ctx).and_then(|ctx| {
        let expr = utf8_arg(expr, "expression", |offset| {
            Error::Parse(grok_engine::ParseError {
                message: "Expression is not valid UTF-8".into(),
                offset,
            })
        })?;
        ctx.registry.compile_expression(expr)
    });
    match result {
        Ok(handle) => handle.raw(),
        Err(e) => {
            report(err, &e);
            0
        }
    }
}

/// Release a machine. Unknown handles and 0 are ignored.
///
/// # Safety
/// `ctx` must be null or a live context.
#[no_mangle]
pub unsafe extern "C" fn grok_free_machine(ctx: *mut GrokContext, machine: u64) {
    if let Some(ctx) = ctx.as_mut() {
        ctx.registry.free_machine(MachineHandle::from_raw(machine));
    }
}

/// Parse `len` bytes as an HTML document. Returns 0 on failure.
///
/// # Safety
/// `ctx` must be a live context, `data` valid for `len` bytes (or null when
/// `len` is 0), and `err` null or a valid `GrokError`.
#[no_mangle]
pub unsafe extern "C" fn grok_open_document_from_bytes(
    ctx: *mut GrokContext,
    data: *const u8,
    len: usize,
    err: *mut GrokError,
) -> u64 {
    let result = context(ctx).and_then(|ctx| {
        let bytes = if len == 0 {
            &[][..]
        } else if data.is_null() {
            return Err(Error::Runtime("data is a null pointer".into()));
        } else {
            std::slice::from_raw_parts(data, len)
        };
        ctx.registry.open_document_from_bytes(bytes)
    });
    document_result(result, err)
}

/// Parse a NUL-terminated UTF-8 string as an HTML document. Charset
/// declarations inside the document are ignored; prefer
/// [`grok_open_document_from_bytes`] with the bytes a server returned.
///
/// # Safety
/// As for [`grok_compile_expression`].
#[no_mangle]
pub unsafe extern "C" fn grok_open_document_from_string(
    ctx: *mut GrokContext,
    document: *const c_char,
    err: *mut GrokError,
) -> u64 {
    let result = context(ctx).and_then(|ctx| {
        let text = utf8_arg(document, "document", |_| {
            Error::Document(grok_engine::DocumentError::new("Document string is not valid UTF-8"))
        })?;
        ctx.registry.open_document_from_string(text)
    });
    document_result(result, err)
}

/// Fetch and parse a document from a URI or filesystem path.
///
/// # Safety
/// As for [`grok_compile_expression`].
#[no_mangle]
pub unsafe extern "C" fn grok_open_document_from_uri(
    ctx: *mut GrokContext,
    uri: *const c_char,
    err: *mut GrokError,
) -> u64 {
    let result = context(ctx).and_then(|ctx| {
        let uri = utf8_arg(uri, "uri", |_| {
            Error::Document(grok_engine::DocumentError::new("URI is not valid UTF-8"))
        })?;
        ctx.registry.open_document_from_uri(uri)
    });
    document_result(result, err)
}

unsafe fn document_result(result: Result<DocumentHandle, Error>, err: *mut GrokError) -> u64 {
    match result {
        Ok(handle) => handle.raw(),
        Err(e) => {
            report(err, &e);
            0
        }
    }
}

/// Release a document. Unknown handles and 0 are ignored.
///
/// # Safety
/// `ctx` must be null or a live context.
#[no_mangle]
pub unsafe extern "C" fn grok_free_document(ctx: *mut GrokContext, document: u64) {
    if let Some(ctx) = ctx.as_mut() {
        ctx.registry.free_document(DocumentHandle::from_raw(document));
    }
}

/// Search a document and render `template`. Returns a string to release
/// with [`grok_string_free`], or null on failure.
///
/// # Safety
/// As for [`grok_compile_expression`], with `template` NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn grok_search_document(
    ctx: *mut GrokContext,
    document: u64,
    template: *const c_char,
    machine: u64,
    err: *mut GrokError,
) -> *mut c_char {
    let result = context(ctx).and_then(|ctx| {
        let template = utf8_arg(template, "template", |_| {
            Error::Runtime("Template is not valid UTF-8".into())
        })?;
        let rendered = ctx.registry.search_document(
            DocumentHandle::from_raw(document),
            template,
            MachineHandle::from_raw(machine),
        )?;
        CString::new(rendered).map_err(|_| Error::Runtime("Result contains a NUL byte".into()))
    });
    match result {
        Ok(s) => s.into_raw(),
        Err(e) => {
            report(err, &e);
            ptr::null_mut()
        }
    }
}

/// Release a string returned by [`grok_search_document`].
///
/// # Safety
/// `s` must be null or a string from this library not yet freed.
#[no_mangle]
pub unsafe extern "C" fn grok_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Release the message held by `err` and reset it to `GROK_OK`.
///
/// # Safety
/// `err` must be null or a valid `GrokError`.
#[no_mangle]
pub unsafe extern "C" fn grok_error_clear(err: *mut GrokError) {
    if let Some(err) = err.as_mut() {
        clear(err);
    }
}

/// Library version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn grok_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Native tests: drive the C surface the way a foreign caller would
    // =========================================================================

    fn empty_error() -> GrokError {
        GrokError {
            kind: GROK_OK,
            offset: -1,
            message: ptr::null_mut(),
        }
    }

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    unsafe fn message(err: &GrokError) -> String {
        CStr::from_ptr(err.message).to_string_lossy().into_owned()
    }

    const DOC: &str = "<h1>Foo!</h1><h2>Bar!</h2><table><tr><td>foo = baz</td></tr></table>";

    #[test]
    fn test_search_scenario() {
        unsafe {
            let ctx = grok_context_new();
            let mut err = empty_error();

            let m1 = grok_compile_expression(ctx, c(r#"tr -> td -> text:"foo = (.*)""#).as_ptr(), &mut err);
            let m2 = grok_compile_expression(ctx, c(r#"tr -> td -> text:"bar = (.*)""#).as_ptr(), &mut err);
            let doc = grok_open_document_from_bytes(ctx, DOC.as_ptr(), DOC.len(), &mut err);
            assert!(m1 != 0 && m2 != 0 && doc != 0);
            assert_eq!(err.kind, GROK_OK);

            let out = grok_search_document(ctx, doc, c(r"foo is \1").as_ptr(), m1, &mut err);
            assert_eq!(CStr::from_ptr(out).to_str().unwrap(), "foo is baz");
            grok_string_free(out);

            let out = grok_search_document(ctx, doc, c(r"bar is \1").as_ptr(), m2, &mut err);
            assert!(out.is_null());
            assert_eq!(err.kind, GROK_ERR_RUNTIME);
            assert_eq!(message(&err), "No match found");
            grok_error_clear(&mut err);
            assert!(err.message.is_null());

            grok_free_document(ctx, doc);
            grok_free_machine(ctx, m1);
            grok_free_machine(ctx, m2);
            grok_context_free(ctx);
        }
    }

    #[test]
    fn test_parse_error_offset() {
        unsafe {
            let ctx = grok_context_new();
            let mut err = empty_error();
            let m = grok_compile_expression(ctx, c(r#"table<border="0" foo=>"#).as_ptr(), &mut err);
            assert_eq!(m, 0);
            assert_eq!(err.kind, GROK_ERR_PARSE);
            assert_eq!(err.offset, 21);
            grok_error_clear(&mut err);
            grok_context_free(ctx);
        }
    }

    #[test]
    fn test_invalid_utf8_expression_offset() {
        unsafe {
            let ctx = grok_context_new();
            let mut err = empty_error();
            let expr = CString::new(&b"td -> \xff"[..]).unwrap();
            assert_eq!(grok_compile_expression(ctx, expr.as_ptr(), &mut err), 0);
            assert_eq!(err.kind, GROK_ERR_PARSE);
            assert_eq!(err.offset, 6);
            grok_error_clear(&mut err);
            grok_context_free(ctx);
        }
    }

    #[test]
    fn test_range_error_and_reuse() {
        unsafe {
            let ctx = grok_context_new();
            let mut err = empty_error();
            let m = grok_compile_expression(ctx, c(r#"td -> text:"(.*)""#).as_ptr(), &mut err);
            let doc = grok_open_document_from_string(ctx, c(DOC).as_ptr(), &mut err);

            assert!(grok_search_document(ctx, doc, c(r"\9").as_ptr(), m, &mut err).is_null());
            assert_eq!(err.kind, GROK_ERR_RANGE);

            // A second failure replaces the first message without leaking it.
            assert!(grok_search_document(ctx, doc, c(r"\9").as_ptr(), m, &mut err).is_null());
            grok_error_clear(&mut err);

            let out = grok_search_document(ctx, doc, c(r"\0").as_ptr(), m, &mut err);
            assert_eq!(CStr::from_ptr(out).to_str().unwrap(), "foo = baz");
            grok_string_free(out);
            grok_context_free(ctx);
        }
    }

    #[test]
    fn test_sentinels_and_nulls() {
        unsafe {
            let ctx = grok_context_new();
            grok_free_machine(ctx, 0);
            grok_free_document(ctx, 0);
            grok_free_machine(ptr::null_mut(), 7);
            grok_string_free(ptr::null_mut());
            grok_error_clear(ptr::null_mut());

            let m = grok_compile_expression(ctx, c("td").as_ptr(), ptr::null_mut());
            grok_free_machine(ctx, m);
            grok_free_machine(ctx, m);

            let mut err = empty_error();
            assert_eq!(grok_compile_expression(ctx, ptr::null(), &mut err), 0);
            assert_eq!(err.kind, GROK_ERR_RUNTIME);
            grok_error_clear(&mut err);

            assert_eq!(grok_open_document_from_bytes(ctx, ptr::null(), 0, &mut err), 0);
            assert_eq!(err.kind, GROK_ERR_DOCUMENT);
            grok_error_clear(&mut err);

            grok_context_free(ctx);
            grok_context_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_version() {
        let v = unsafe { CStr::from_ptr(grok_version()) };
        assert_eq!(v.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
