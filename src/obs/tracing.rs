// crates.io
use tracing::{Instrument, Span, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::RefreshPath};

/// A span builder used by the refresh paths.
#[derive(Clone, Debug)]
pub struct RefreshSpan {
	span: Span,
}
impl RefreshSpan {
	/// Creates a new span tagged with the provided path + stage.
	pub fn new(path: RefreshPath, stage: &'static str) -> Self {
		let span = tracing::info_span!(
			"session_refresher.refresh",
			path = path.as_str(),
			stage,
			credential = tracing::field::Empty,
		);

		Self { span }
	}

	/// Attaches the credential fingerprint once it is known.
	pub fn record_credential(&self, fingerprint: &impl Display) {
		self.span.record("credential", tracing::field::display(fingerprint));
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}
