use thiserror::Error;

/// A malformed message was encountered while decoding.
///
/// Per the core's error-handling contract, a decode failure is never fatal:
/// the caller drops the packet and increments a counter. This type exists so
/// that bookkeeping (and, at `debug!`/`warn!` level, diagnostics) has
/// something more specific than "it didn't parse" to report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("message is shorter than a DNS header ({0} bytes)")]
	Truncated(usize),
	#[error("name label exceeds 63 bytes")]
	LabelTooLong,
	#[error("name exceeds 255 octets")]
	NameTooLong,
	#[error("name compression pointer is out of range or points forward")]
	BadPointer,
	#[error("name compression chain exceeds the depth limit")]
	PointerLoop,
	#[error("resource record rdata length does not match the record's declared rdlength")]
	BadRdataLength,
	#[error("unsupported or malformed OPT rdata")]
	BadOpt,
	#[error("unexpected end of message while reading a {0}")]
	UnexpectedEnd(&'static str),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
