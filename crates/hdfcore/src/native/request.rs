//! Requests for operations the native connector ran to completion before
//! returning. A request is born final; waiting never blocks.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use super::NativeConnector;
use crate::error::{Category, Error, Result};
use crate::vol::{CallCtx, RequestClass, RequestNotify, RequestStatus, VolObject};

#[derive(Debug)]
pub struct NativeRequest {
    status: RequestStatus,
    freed: Mutex<bool>,
}

impl NativeRequest {
    pub fn completed(status: RequestStatus) -> Self {
        Self {
            status,
            freed: Mutex::new(false),
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }
}

/// Hand back a finished request if the caller asked for one.
pub(crate) fn complete(cx: &mut CallCtx) {
    if cx.wants_request() {
        cx.set_request(VolObject::new(NativeRequest::completed(RequestStatus::Succeeded)));
    }
}

fn live(req: &VolObject) -> Result<std::sync::Arc<NativeRequest>> {
    let r = req
        .downcast::<NativeRequest>()
        .ok_or_else(|| Error::args(Category::Request, "not a native request"))?;
    if *r.freed.lock() {
        return Err(Error::args(Category::Request, "request was already freed"));
    }
    Ok(r)
}

impl RequestClass for NativeConnector {
    fn wait(&self, _cx: &mut CallCtx, req: &VolObject, _timeout: Duration) -> Result<RequestStatus> {
        Ok(live(req)?.status)
    }

    fn notify(&self, _cx: &mut CallCtx, req: &VolObject, cb: RequestNotify) -> Result<()> {
        let status = live(req)?.status;
        cb(status);
        Ok(())
    }

    fn cancel(&self, _cx: &mut CallCtx, req: &VolObject) -> Result<RequestStatus> {
        Ok(live(req)?.status)
    }

    fn free(&self, _cx: &mut CallCtx, req: &VolObject) -> Result<()> {
        let r = live(req)?;
        *r.freed.lock() = true;
        trace!("request freed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::library::Library;
    use crate::plist::TransferProps;

    #[test]
    fn finished_request_reports_and_frees_once() {
        let mut cx = CallCtx::new(Library::with_config(LibraryConfig::default()), TransferProps::default());
        let cx = &mut cx;
        let c = NativeConnector::new();
        let req = VolObject::new(NativeRequest::completed(RequestStatus::Succeeded));
        assert_eq!(c.wait(cx, &req, Duration::ZERO).unwrap(), RequestStatus::Succeeded);
        assert_eq!(c.cancel(cx, &req).unwrap(), RequestStatus::Succeeded);
        let seen = std::sync::Arc::new(Mutex::new(None));
        let sink = seen.clone();
        c.notify(cx, &req, Box::new(move |s| *sink.lock() = Some(s))).unwrap();
        assert_eq!(*seen.lock(), Some(RequestStatus::Succeeded));
        c.free(cx, &req).unwrap();
        assert!(c.free(cx, &req).is_err());
        assert!(c.wait(cx, &req, Duration::ZERO).is_err());
    }
}
