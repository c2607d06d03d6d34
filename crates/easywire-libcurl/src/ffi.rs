//! Raw C-ABI surface of the libcurl easy interface.
//!
//! Only the types, option identifiers and status codes the safety layer touches
//! are declared here; everything else is forwarded by numeric value.

#![allow(non_camel_case_types)]

use libc::{c_char, c_double, c_int, c_long, c_void, size_t};

/// Opaque easy handle owned by the engine.
#[repr(C)]
pub struct CURL {
    _private: [u8; 0],
}

/// Status code returned by every easy call.
pub type CURLcode = c_int;
/// Numeric option identifier passed to `curl_easy_setopt`.
pub type CURLoption = c_int;
/// Numeric info identifier passed to `curl_easy_getinfo`.
pub type CURLINFO = c_int;
/// Category of a debug callback message.
pub type curl_infotype = c_int;

/// Node of the engine's singly linked string list.
#[repr(C)]
#[derive(Debug)]
pub struct curl_slist {
    /// NUL-terminated string owned by the list.
    pub data: *mut c_char,
    /// Next node, null at the tail.
    pub next: *mut curl_slist,
}

/// Signature shared by the write, read and header callbacks.
pub type curl_data_callback = unsafe extern "C" fn(
    buffer: *mut c_char,
    size: size_t,
    nmemb: size_t,
    userdata: *mut c_void,
) -> size_t;

/// Legacy progress callback signature (`CURLOPT_PROGRESSFUNCTION`).
pub type curl_progress_callback = unsafe extern "C" fn(
    clientp: *mut c_void,
    dltotal: c_double,
    dlnow: c_double,
    ultotal: c_double,
    ulnow: c_double,
) -> c_int;

/// Debug callback signature (`CURLOPT_DEBUGFUNCTION`).
pub type curl_debug_callback = unsafe extern "C" fn(
    handle: *mut CURL,
    kind: curl_infotype,
    data: *mut c_char,
    size: size_t,
    userptr: *mut c_void,
) -> c_int;

/// Base of the `long` option range.
pub const CURLOPTTYPE_LONG: CURLoption = 0;
/// Base of the object pointer option range (strings and opaque data).
pub const CURLOPTTYPE_OBJECTPOINT: CURLoption = 10_000;
/// Base of the function pointer option range.
pub const CURLOPTTYPE_FUNCTIONPOINT: CURLoption = 20_000;
/// Base of the `curl_off_t` option range.
pub const CURLOPTTYPE_OFF_T: CURLoption = 30_000;

pub const CURLOPT_WRITEDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 1;
pub const CURLOPT_URL: CURLoption = CURLOPTTYPE_OBJECTPOINT + 2;
pub const CURLOPT_READDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 9;
pub const CURLOPT_ERRORBUFFER: CURLoption = CURLOPTTYPE_OBJECTPOINT + 10;
pub const CURLOPT_TIMEOUT: CURLoption = CURLOPTTYPE_LONG + 13;
pub const CURLOPT_INFILESIZE: CURLoption = CURLOPTTYPE_LONG + 14;
pub const CURLOPT_POSTFIELDS: CURLoption = CURLOPTTYPE_OBJECTPOINT + 15;
pub const CURLOPT_USERAGENT: CURLoption = CURLOPTTYPE_OBJECTPOINT + 18;
pub const CURLOPT_HTTPHEADER: CURLoption = CURLOPTTYPE_OBJECTPOINT + 23;
pub const CURLOPT_HTTPPOST: CURLoption = CURLOPTTYPE_OBJECTPOINT + 24;
pub const CURLOPT_QUOTE: CURLoption = CURLOPTTYPE_OBJECTPOINT + 28;
pub const CURLOPT_HEADERDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 29;
pub const CURLOPT_COOKIEFILE: CURLoption = CURLOPTTYPE_OBJECTPOINT + 31;
pub const CURLOPT_CUSTOMREQUEST: CURLoption = CURLOPTTYPE_OBJECTPOINT + 36;
pub const CURLOPT_STDERR: CURLoption = CURLOPTTYPE_OBJECTPOINT + 37;
pub const CURLOPT_POSTQUOTE: CURLoption = CURLOPTTYPE_OBJECTPOINT + 39;
pub const CURLOPT_VERBOSE: CURLoption = CURLOPTTYPE_LONG + 41;
pub const CURLOPT_NOPROGRESS: CURLoption = CURLOPTTYPE_LONG + 43;
pub const CURLOPT_UPLOAD: CURLoption = CURLOPTTYPE_LONG + 46;
pub const CURLOPT_POST: CURLoption = CURLOPTTYPE_LONG + 47;
pub const CURLOPT_FOLLOWLOCATION: CURLoption = CURLOPTTYPE_LONG + 52;
pub const CURLOPT_PUT: CURLoption = CURLOPTTYPE_LONG + 54;
pub const CURLOPT_PROGRESSDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 57;
pub const CURLOPT_POSTFIELDSIZE: CURLoption = CURLOPTTYPE_LONG + 60;
pub const CURLOPT_SSL_VERIFYPEER: CURLoption = CURLOPTTYPE_LONG + 64;
pub const CURLOPT_TELNETOPTIONS: CURLoption = CURLOPTTYPE_OBJECTPOINT + 70;
pub const CURLOPT_CONNECTTIMEOUT: CURLoption = CURLOPTTYPE_LONG + 78;
pub const CURLOPT_COOKIEJAR: CURLoption = CURLOPTTYPE_OBJECTPOINT + 82;
pub const CURLOPT_PREQUOTE: CURLoption = CURLOPTTYPE_OBJECTPOINT + 93;
pub const CURLOPT_DEBUGDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 95;
pub const CURLOPT_NOSIGNAL: CURLoption = CURLOPTTYPE_LONG + 99;
pub const CURLOPT_SHARE: CURLoption = CURLOPTTYPE_OBJECTPOINT + 100;
pub const CURLOPT_PRIVATE: CURLoption = CURLOPTTYPE_OBJECTPOINT + 103;
pub const CURLOPT_HTTP200ALIASES: CURLoption = CURLOPTTYPE_OBJECTPOINT + 104;
pub const CURLOPT_SSL_CTX_DATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 109;
pub const CURLOPT_FTP_RESPONSE_TIMEOUT: CURLoption = CURLOPTTYPE_LONG + 112;
pub const CURLOPT_IOCTLDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 131;
pub const CURLOPT_COOKIELIST: CURLoption = CURLOPTTYPE_OBJECTPOINT + 135;
pub const CURLOPT_SOCKOPTDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 149;
pub const CURLOPT_OPENSOCKETDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 164;
pub const CURLOPT_SEEKDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 168;
pub const CURLOPT_SSH_KEYDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 185;
pub const CURLOPT_MAIL_RCPT: CURLoption = CURLOPTTYPE_OBJECTPOINT + 187;
pub const CURLOPT_INTERLEAVEDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 195;
pub const CURLOPT_CHUNK_DATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 201;
pub const CURLOPT_FNMATCH_DATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 202;
pub const CURLOPT_RESOLVE: CURLoption = CURLOPTTYPE_OBJECTPOINT + 203;
pub const CURLOPT_CLOSESOCKETDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 209;
pub const CURLOPT_PROXYHEADER: CURLoption = CURLOPTTYPE_OBJECTPOINT + 228;
pub const CURLOPT_STREAM_DEPENDS: CURLoption = CURLOPTTYPE_OBJECTPOINT + 240;
pub const CURLOPT_STREAM_DEPENDS_E: CURLoption = CURLOPTTYPE_OBJECTPOINT + 241;
pub const CURLOPT_CONNECT_TO: CURLoption = CURLOPTTYPE_OBJECTPOINT + 243;
pub const CURLOPT_MIMEPOST: CURLoption = CURLOPTTYPE_OBJECTPOINT + 269;
pub const CURLOPT_RESOLVER_START_DATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 273;
pub const CURLOPT_CURLU: CURLoption = CURLOPTTYPE_OBJECTPOINT + 282;
pub const CURLOPT_TRAILERDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 284;
pub const CURLOPT_SSLCERT_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 291;
pub const CURLOPT_SSLKEY_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 292;
pub const CURLOPT_PROXY_SSLCERT_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 293;
pub const CURLOPT_PROXY_SSLKEY_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 294;
pub const CURLOPT_ISSUERCERT_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 295;
pub const CURLOPT_PROXY_ISSUERCERT_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 296;
pub const CURLOPT_HSTSREADDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 302;
pub const CURLOPT_HSTSWRITEDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 304;
pub const CURLOPT_CAINFO_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 309;
pub const CURLOPT_PROXY_CAINFO_BLOB: CURLoption = CURLOPTTYPE_OBJECTPOINT + 310;
pub const CURLOPT_PREREQDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 313;
pub const CURLOPT_SSH_HOSTKEYDATA: CURLoption = CURLOPTTYPE_OBJECTPOINT + 317;
pub const CURLOPT_WRITEFUNCTION: CURLoption = CURLOPTTYPE_FUNCTIONPOINT + 11;
pub const CURLOPT_READFUNCTION: CURLoption = CURLOPTTYPE_FUNCTIONPOINT + 12;
pub const CURLOPT_PROGRESSFUNCTION: CURLoption = CURLOPTTYPE_FUNCTIONPOINT + 56;
pub const CURLOPT_HEADERFUNCTION: CURLoption = CURLOPTTYPE_FUNCTIONPOINT + 79;
pub const CURLOPT_DEBUGFUNCTION: CURLoption = CURLOPTTYPE_FUNCTIONPOINT + 94;

/// Object options whose argument is not a NUL-terminated string: output
/// buffers, native structures, string lists and opaque callback data.
pub const NON_STRING_OBJECT_OPTIONS: &[CURLoption] = &[
    CURLOPT_WRITEDATA,
    CURLOPT_READDATA,
    CURLOPT_ERRORBUFFER,
    CURLOPT_HTTPHEADER,
    CURLOPT_HTTPPOST,
    CURLOPT_QUOTE,
    CURLOPT_HEADERDATA,
    CURLOPT_STDERR,
    CURLOPT_POSTQUOTE,
    CURLOPT_PROGRESSDATA,
    CURLOPT_TELNETOPTIONS,
    CURLOPT_PREQUOTE,
    CURLOPT_DEBUGDATA,
    CURLOPT_SHARE,
    CURLOPT_PRIVATE,
    CURLOPT_HTTP200ALIASES,
    CURLOPT_SSL_CTX_DATA,
    CURLOPT_IOCTLDATA,
    CURLOPT_SOCKOPTDATA,
    CURLOPT_OPENSOCKETDATA,
    CURLOPT_SEEKDATA,
    CURLOPT_SSH_KEYDATA,
    CURLOPT_MAIL_RCPT,
    CURLOPT_INTERLEAVEDATA,
    CURLOPT_CHUNK_DATA,
    CURLOPT_FNMATCH_DATA,
    CURLOPT_RESOLVE,
    CURLOPT_CLOSESOCKETDATA,
    CURLOPT_PROXYHEADER,
    CURLOPT_STREAM_DEPENDS,
    CURLOPT_STREAM_DEPENDS_E,
    CURLOPT_CONNECT_TO,
    CURLOPT_MIMEPOST,
    CURLOPT_RESOLVER_START_DATA,
    CURLOPT_CURLU,
    CURLOPT_TRAILERDATA,
    CURLOPT_SSLCERT_BLOB,
    CURLOPT_SSLKEY_BLOB,
    CURLOPT_PROXY_SSLCERT_BLOB,
    CURLOPT_PROXY_SSLKEY_BLOB,
    CURLOPT_ISSUERCERT_BLOB,
    CURLOPT_PROXY_ISSUERCERT_BLOB,
    CURLOPT_HSTSREADDATA,
    CURLOPT_HSTSWRITEDATA,
    CURLOPT_CAINFO_BLOB,
    CURLOPT_PROXY_CAINFO_BLOB,
    CURLOPT_PREREQDATA,
    CURLOPT_SSH_HOSTKEYDATA,
];

pub const CURLE_OK: CURLcode = 0;
pub const CURLE_UNSUPPORTED_PROTOCOL: CURLcode = 1;
pub const CURLE_FAILED_INIT: CURLcode = 2;
pub const CURLE_URL_MALFORMAT: CURLcode = 3;
pub const CURLE_COULDNT_RESOLVE_HOST: CURLcode = 6;
pub const CURLE_COULDNT_CONNECT: CURLcode = 7;
pub const CURLE_WRITE_ERROR: CURLcode = 23;
pub const CURLE_READ_ERROR: CURLcode = 26;
pub const CURLE_OUT_OF_MEMORY: CURLcode = 27;
pub const CURLE_OPERATION_TIMEDOUT: CURLcode = 28;
pub const CURLE_SSL_CONNECT_ERROR: CURLcode = 35;
pub const CURLE_ABORTED_BY_CALLBACK: CURLcode = 42;
pub const CURLE_BAD_FUNCTION_ARGUMENT: CURLcode = 43;
pub const CURLE_UNKNOWN_OPTION: CURLcode = 48;

pub const CURLINFO_STRING: CURLINFO = 0x10_0000;
pub const CURLINFO_LONG: CURLINFO = 0x20_0000;
pub const CURLINFO_DOUBLE: CURLINFO = 0x30_0000;
pub const CURLINFO_SLIST: CURLINFO = 0x40_0000;
/// Mask selecting the value-type bits of a `CURLINFO` identifier.
pub const CURLINFO_TYPEMASK: CURLINFO = 0xf0_0000;

pub const CURLINFO_EFFECTIVE_URL: CURLINFO = CURLINFO_STRING + 1;
pub const CURLINFO_RESPONSE_CODE: CURLINFO = CURLINFO_LONG + 2;
pub const CURLINFO_TOTAL_TIME: CURLINFO = CURLINFO_DOUBLE + 3;
pub const CURLINFO_SIZE_UPLOAD: CURLINFO = CURLINFO_DOUBLE + 7;
pub const CURLINFO_SIZE_DOWNLOAD: CURLINFO = CURLINFO_DOUBLE + 8;
pub const CURLINFO_COOKIELIST: CURLINFO = CURLINFO_SLIST + 28;

pub const CURLINFO_TEXT: curl_infotype = 0;
pub const CURLINFO_HEADER_IN: curl_infotype = 1;
pub const CURLINFO_HEADER_OUT: curl_infotype = 2;
pub const CURLINFO_DATA_IN: curl_infotype = 3;
pub const CURLINFO_DATA_OUT: curl_infotype = 4;
pub const CURLINFO_SSL_DATA_IN: curl_infotype = 5;
pub const CURLINFO_SSL_DATA_OUT: curl_infotype = 6;

/// Initialise every engine subsystem (`CURL_GLOBAL_SSL | CURL_GLOBAL_WIN32`).
pub const CURL_GLOBAL_ALL: c_long = 3;

/// Read callback return value that aborts the transfer.
pub const CURL_READFUNC_ABORT: size_t = 0x1000_0000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn slist_node_layout_matches_c() {
        assert_eq!(mem::size_of::<curl_slist>(), 2 * mem::size_of::<*mut c_void>());
        assert_eq!(mem::align_of::<curl_slist>(), mem::align_of::<*mut c_void>());
    }

    #[test]
    fn option_ranges_are_disjoint() {
        assert!(CURLOPT_VERBOSE < CURLOPTTYPE_OBJECTPOINT);
        assert!((CURLOPTTYPE_OBJECTPOINT..CURLOPTTYPE_FUNCTIONPOINT).contains(&CURLOPT_URL));
        assert!((CURLOPTTYPE_FUNCTIONPOINT..CURLOPTTYPE_OFF_T).contains(&CURLOPT_DEBUGFUNCTION));
        assert_eq!(CURLINFO_COOKIELIST & CURLINFO_TYPEMASK, CURLINFO_SLIST);
    }

    #[test]
    fn non_string_objects_stay_in_the_object_range() {
        for option in NON_STRING_OBJECT_OPTIONS {
            assert!((CURLOPTTYPE_OBJECTPOINT..CURLOPTTYPE_FUNCTIONPOINT).contains(option));
        }
        assert!(!NON_STRING_OBJECT_OPTIONS.contains(&CURLOPT_URL));
        assert!(!NON_STRING_OBJECT_OPTIONS.contains(&CURLOPT_COOKIELIST));
    }
}
