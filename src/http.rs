//! Transport seam for token endpoint calls.
//!
//! Backends never talk to an HTTP stack directly. They ask a [`TokenHttpClient`] for a
//! short-lived [`AsyncHttpClient`] handle bound to a [`ResponseMetadataSlot`]; the handle records
//! the status and `Retry-After` hint of every response so failures can be classified after the
//! `oauth2` crate (or the delegated form post) has consumed the body. Transport failures are
//! turned into crate errors by a [`TransportErrorMapper`].

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError,
	http::{HeaderMap, header::RETRY_AFTER},
};
#[cfg(feature = "reqwest")] use oauth2::{HttpRequest, HttpResponse};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, DecodingError, TransportError},
	obs::{FlowKind, flow_event},
};

/// HTTP transport able to execute token requests while publishing response metadata.
///
/// Implementations are shared behind [`Arc`] by every backend built from them and must hand out
/// handles whose request futures are `Send`, so backend futures can move between executor
/// threads.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle that records response metadata in `slot`.
	///
	/// Handles clear the slot before sending and store fresh metadata as soon as a response
	/// (successful or not) arrives.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata captured from the most recent token endpoint response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint as sent; resolve it with [`RetryAfter::remaining`].
	pub retry_after: Option<RetryAfter>,
}

/// Shared slot carrying [`ResponseMetadata`] from the transport to error classification.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Maps transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] raised while `flow` talked to a token endpoint.
	fn map_transport_error(
		&self,
		flow: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(flow, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => unexpected_transport_failure(meta, message),
			_ => unexpected_transport_failure(meta, "unknown HTTP client failure"),
		}
	}
}

/// Thin wrapper around [`ReqwestClient`].
///
/// Token endpoints answer directly, so a custom client passed to
/// [`ReqwestHttpClient::with_client`] should not follow redirects.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new(InstrumentedHttpClient { client: self.0.clone(), slot }))
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`]; records metadata for each call.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response =
				inner.client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			inner.slot.store(ResponseMetadata {
				status: Some(status.as_u16()),
				retry_after: RetryAfter::from_headers(&headers),
			});

			let mut instrumented =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*instrumented.status_mut() = status;
			*instrumented.headers_mut() = headers;

			Ok(instrumented)
		})
	}
}

/// `Retry-After` header value: delay seconds or an HTTP date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryAfter {
	/// Relative delay.
	Delay(Duration),
	/// Absolute instant.
	At(OffsetDateTime),
}
impl RetryAfter {
	/// Reads the header; unparseable values are ignored.
	pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
		let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

		if let Ok(secs) = raw.parse::<u32>() {
			return Some(Self::Delay(Duration::seconds(i64::from(secs))));
		}

		OffsetDateTime::parse(raw, &Rfc2822).ok().map(Self::At)
	}

	/// Delay left at `now`; dates already in the past yield `None`.
	pub fn remaining(self, now: OffsetDateTime) -> Option<Duration> {
		match self {
			Self::Delay(delay) => Some(delay),
			Self::At(moment) => Some(moment - now).filter(|delta| delta.is_positive()),
		}
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(flow: FlowKind, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}

	flow_event!(warn, flow = flow.as_str(), timeout = err.is_timeout(), "Token endpoint unreachable.");

	#[cfg(not(feature = "tracing"))]
	let _ = flow;

	TransportError::from(err).into()
}

fn unexpected_transport_failure(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	DecodingError::UnexpectedResponse {
		status: meta.and_then(|value| value.status),
		body_preview: Some(message.to_string()),
	}
	.into()
}
