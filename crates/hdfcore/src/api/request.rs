use std::time::Duration;

use crate::error::Result;
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::vol::{dispatch, OptionalArgs, RequestNotify, RequestStatus};

impl Library {
    /// Wait up to `timeout` for the request to finish. A zero timeout only
    /// polls. The request stays registered until it is closed.
    pub fn request_wait(&self, req: Hid, timeout: Duration) -> Result<RequestStatus> {
        self.api(|cx| {
            let req = self.object(req, &[IdKind::Request])?;
            dispatch::request_wait(cx, &req, timeout)
        })
    }

    /// Run `cb` once the request reaches a final state, immediately if it
    /// already has.
    pub fn request_notify(&self, req: Hid, cb: RequestNotify) -> Result<()> {
        self.api(|cx| {
            let req = self.object(req, &[IdKind::Request])?;
            dispatch::request_notify(cx, &req, cb)
        })
    }

    pub fn request_cancel(&self, req: Hid) -> Result<RequestStatus> {
        self.api(|cx| {
            let req = self.object(req, &[IdKind::Request])?;
            dispatch::request_cancel(cx, &req)
        })
    }

    pub fn request_optional(&self, req: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let req = self.object(req, &[IdKind::Request])?;
            dispatch::request_optional(cx, &req, args)
        })
    }
}
