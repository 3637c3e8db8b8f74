use std::cell::RefCell;
use std::rc::Rc;

use crate::lang::value::{ObjectRef, Value};
use crate::runtime::completion::Completion;
use crate::runtime::runtime_error::RuntimeError;

/// An `input()` style question for a connected client.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub receiver: Value,
    pub message: String,
    pub title: String,
    pub default: Value,
    /// Accepted answer types, as bit flags chosen by the compiler.
    pub input_type: i32,
}

/// The session side of the runtime: everything that talks to clients.
pub trait HostIo {
    /// Show `body` in a browser window, or close it when `body` is null.
    fn browse(&mut self, receiver: &Value, body: &Value, options: &str)
    -> Result<(), RuntimeError>;

    /// Send a resource file to the client's cache under `filename`.
    fn browse_resource(
        &mut self,
        receiver: &Value,
        resource: &Value,
        filename: &str,
    ) -> Result<(), RuntimeError>;

    fn output_control(
        &mut self,
        receiver: &Value,
        message: &str,
        control: &str,
    ) -> Result<(), RuntimeError>;

    /// Ask a client something. The answer arrives later through the
    /// returned completion; the asking thread defers until then.
    fn prompt(&mut self, request: PromptRequest) -> Result<Completion, RuntimeError>;

    /// The turf at a map coordinate, if any.
    fn locate_coord(&mut self, x: i32, y: i32, z: i32) -> Result<Option<ObjectRef>, RuntimeError>;
}

/// Host with no clients attached. Output goes nowhere and prompts answer
/// their default right away.
#[derive(Debug, Default)]
pub struct NullHost;

impl HostIo for NullHost {
    fn browse(&mut self, _: &Value, _: &Value, _: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn browse_resource(&mut self, _: &Value, _: &Value, _: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn output_control(&mut self, _: &Value, _: &str, _: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn prompt(&mut self, request: PromptRequest) -> Result<Completion, RuntimeError> {
        Ok(Completion::ready(request.default))
    }

    fn locate_coord(&mut self, _: i32, _: i32, _: i32) -> Result<Option<ObjectRef>, RuntimeError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Browse {
        receiver: Value,
        body: Value,
        options: String,
    },
    BrowseResource {
        receiver: Value,
        resource: Value,
        filename: String,
    },
    Output {
        receiver: Value,
        message: String,
        control: String,
    },
}

#[derive(Debug, Default)]
pub struct HostLog {
    pub events: Vec<HostEvent>,
    /// Prompts waiting for an answer, oldest first.
    pub prompts: Vec<(PromptRequest, Completion)>,
}

/// Host that records what it was asked to do and leaves prompts pending
/// until someone answers them through the shared log.
#[derive(Debug, Default)]
pub struct RecordingHost {
    log: Rc<RefCell<HostLog>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Rc<RefCell<HostLog>> {
        self.log.clone()
    }
}

impl HostIo for RecordingHost {
    fn browse(&mut self, receiver: &Value, body: &Value, options: &str) -> Result<(), RuntimeError> {
        self.log.borrow_mut().events.push(HostEvent::Browse {
            receiver: receiver.clone(),
            body: body.clone(),
            options: options.to_string(),
        });
        Ok(())
    }

    fn browse_resource(
        &mut self,
        receiver: &Value,
        resource: &Value,
        filename: &str,
    ) -> Result<(), RuntimeError> {
        self.log.borrow_mut().events.push(HostEvent::BrowseResource {
            receiver: receiver.clone(),
            resource: resource.clone(),
            filename: filename.to_string(),
        });
        Ok(())
    }

    fn output_control(
        &mut self,
        receiver: &Value,
        message: &str,
        control: &str,
    ) -> Result<(), RuntimeError> {
        self.log.borrow_mut().events.push(HostEvent::Output {
            receiver: receiver.clone(),
            message: message.to_string(),
            control: control.to_string(),
        });
        Ok(())
    }

    fn prompt(&mut self, request: PromptRequest) -> Result<Completion, RuntimeError> {
        let completion = Completion::new();
        self.log
            .borrow_mut()
            .prompts
            .push((request, completion.clone()));
        Ok(completion)
    }

    fn locate_coord(&mut self, _: i32, _: i32, _: i32) -> Result<Option<ObjectRef>, RuntimeError> {
        Ok(None)
    }
}
