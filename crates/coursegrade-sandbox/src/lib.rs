//! coursegrade-sandbox: Headless DOM sandbox and style assertions.
//!
//! Renders a submission's markup into a throwaway document, binds a
//! computed-style resolver to it, and checks DOM test cases against it.

pub mod color;
pub mod sandbox;
pub mod style;
pub mod stylesheet;
pub mod validator;

use coursegrade_core::model::{FileMap, TestCase};
use coursegrade_core::results::CaseResult;
use coursegrade_core::traits::DomEvaluator;

pub use sandbox::{SandboxHandle, SandboxManager, SelectorError};

/// DOM evaluator backed by `scraper` documents.
#[derive(Debug, Default)]
pub struct HeadlessDom {
    manager: SandboxManager,
}

impl HeadlessDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(&self) -> &SandboxManager {
        &self.manager
    }
}

impl DomEvaluator for HeadlessDom {
    fn evaluate(&self, files: &FileMap, cases: &[(usize, &TestCase)]) -> Vec<CaseResult> {
        let handle = self.manager.acquire(files);
        let results = validator::validate(&handle, cases);
        self.manager.release(handle);
        results
    }
}
