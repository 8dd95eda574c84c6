//! DOM assertions against a sandbox.

use coursegrade_core::model::TestCase;
use coursegrade_core::normalize;
use coursegrade_core::results::{CaseFailure, CaseResult, PropertyMismatch};

use crate::color;
use crate::sandbox::SandboxHandle;

/// Evaluate every case against the sandbox. Never stops at a failing case.
pub fn validate(handle: &SandboxHandle, cases: &[(usize, &TestCase)]) -> Vec<CaseResult> {
    cases
        .iter()
        .map(|(index, case)| validate_case(handle, *index, case))
        .collect()
}

fn validate_case(handle: &SandboxHandle, index: usize, case: &TestCase) -> CaseResult {
    let element = match handle.query(&case.input) {
        Ok(Some(element)) => element,
        Ok(None) => {
            tracing::warn!(selector = %case.input, "no element matches selector");
            return CaseResult::fail(
                index,
                case,
                CaseFailure::ElementNotFound {
                    selector: case.input.clone(),
                },
            );
        }
        Err(e) => {
            tracing::warn!("{e}");
            return CaseResult::fail(
                index,
                case,
                CaseFailure::InvalidSelector {
                    selector: e.selector,
                    reason: e.reason,
                },
            );
        }
    };

    let mut result = CaseResult::pass(index, case);

    if let Some(expected_style) = &case.expected_style {
        let properties: Vec<PropertyMismatch> = expected_style
            .iter()
            .filter(|(property, _)| !property.trim().is_empty())
            .filter_map(|(property, expected)| {
                let actual = handle.computed_style(element, property);
                if style_matches(property, &actual, expected) {
                    None
                } else {
                    Some(PropertyMismatch {
                        property: property.clone(),
                        expected: expected.clone(),
                        actual,
                    })
                }
            })
            .collect();
        if !properties.is_empty() {
            result.failures.push(CaseFailure::StyleMismatch { properties });
        }
    }

    if let Some(expected) = &case.expected_output {
        let actual = element.text().collect::<String>();
        if !normalize::compare(&actual, expected) {
            result.failures.push(CaseFailure::OutputMismatch {
                expected: normalize::normalize(expected),
                actual: normalize::normalize(&actual),
            });
        }
    }

    if let Some(event) = &case.event {
        result.failures.push(CaseFailure::UnsupportedEvent {
            event_type: event.event_type.clone(),
        });
    }

    result
}

fn style_matches(property: &str, actual: &str, expected: &str) -> bool {
    match property.trim().to_ascii_lowercase().as_str() {
        "color" | "background-color" => color::colors_equal(actual, expected),
        _ => actual.trim() == expected.trim(),
    }
}
