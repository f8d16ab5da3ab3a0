//! CTest XML result document parsing.
//!
//! The document is folded into a small element tree and walked explicitly.
//! Only these shapes are consumed:
//!
//! - every `Test` element carrying a `Status` attribute, in document order
//! - `Test/Name`
//! - `Test/Results/NamedMeasurement[@name=…]/Value`
//! - `Test/Results/Measurement/Value`
//!
//! Everything else in the document is ignored.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::StepError;

const ENVIRONMENT: &str = "Environment";
const COMMAND_LINE: &str = "Command Line";
const FAIL_REASON: &str = "Fail Reason";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    NotRun,
    /// Any status CTest reports that is not one of the above.
    Other(String),
}

impl TestStatus {
    fn from_attr(value: &str) -> Self {
        match value {
            "passed" => TestStatus::Passed,
            "failed" => TestStatus::Failed,
            "notrun" => TestStatus::NotRun,
            other => TestStatus::Other(other.to_string()),
        }
    }
}

/// One `Test` element of the result document.
///
/// Text fields hold the raw element text; they are empty when the document
/// does not carry the measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: String,
    pub status: TestStatus,
    pub environment: String,
    pub command_line: String,
    pub output: String,
    /// Present only for failed tests.
    pub fail_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultSummary {
    pub passed: usize,
    pub failed: usize,
    pub not_run: usize,
    pub other: usize,
}

/// Parsed result document: every test outcome in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestResults {
    pub outcomes: Vec<TestOutcome>,
}

impl TestResults {
    pub fn failed(&self) -> impl Iterator<Item = &TestOutcome> {
        self.with_status(TestStatus::Failed)
    }

    pub fn not_run(&self) -> impl Iterator<Item = &TestOutcome> {
        self.with_status(TestStatus::NotRun)
    }

    pub fn summary(&self) -> ResultSummary {
        let mut summary = ResultSummary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::NotRun => summary.not_run += 1,
                TestStatus::Other(_) => summary.other += 1,
            }
        }
        summary
    }

    fn with_status(&self, status: TestStatus) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes
            .iter()
            .filter(move |outcome| outcome.status == status)
    }
}

/// Parse a result document fetched from `path`.
pub fn parse_results(path: &Path, contents: &[u8]) -> Result<TestResults, StepError> {
    let xml = std::str::from_utf8(contents).map_err(|err| StepError::malformed(path, err))?;
    let root = parse_document(xml).map_err(|reason| StepError::malformed(path, reason))?;

    let mut tests = Vec::new();
    root.collect_named("Test", &mut tests);
    let outcomes = tests
        .into_iter()
        .filter_map(|test| {
            let status = TestStatus::from_attr(test.attr("Status")?);
            Some(test_outcome(test, status))
        })
        .collect();
    Ok(TestResults { outcomes })
}

fn test_outcome(test: &Element, status: TestStatus) -> TestOutcome {
    let fail_reason = match status {
        TestStatus::Failed => Some(named_measurement(test, FAIL_REASON).unwrap_or_default()),
        _ => None,
    };
    TestOutcome {
        name: test
            .children_named("Name")
            .next()
            .map(|name| name.text.clone())
            .unwrap_or_default(),
        status,
        environment: named_measurement(test, ENVIRONMENT).unwrap_or_default(),
        command_line: named_measurement(test, COMMAND_LINE).unwrap_or_default(),
        output: measurement(test).unwrap_or_default(),
        fail_reason,
    }
}

/// `Results/NamedMeasurement[@name=name]/Value`
fn named_measurement(test: &Element, name: &str) -> Option<String> {
    test.children_named("Results")
        .flat_map(|results| results.children_named("NamedMeasurement"))
        .filter(|measurement| measurement.attr("name") == Some(name))
        .flat_map(|measurement| measurement.children_named("Value"))
        .map(|value| value.text.clone())
        .next()
}

/// `Results/Measurement/Value`
fn measurement(test: &Element) -> Option<String> {
    test.children_named("Results")
        .flat_map(|results| results.children_named("Measurement"))
        .flat_map(|measurement| measurement.children_named("Value"))
        .map(|value| value.text.clone())
        .next()
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    /// Direct text and CDATA content, concatenated.
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Pre-order walk, so matches come back in document order.
    fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
        }
        for child in &self.children {
            child.collect_named(name, out);
        }
    }
}

fn parse_document(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| format!("at byte {}: {err}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(end) => {
                let element = stack.pop().ok_or_else(|| {
                    format!(
                        "unexpected closing tag </{}>",
                        String::from_utf8_lossy(end.name().as_ref())
                    )
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let unescaped = text.unescape().map_err(|err| err.to_string())?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&unescaped),
                    None if unescaped.trim().is_empty() => {}
                    None => return Err("text outside the root element".to_string()),
                }
            }
            Event::CData(data) => {
                let data = std::str::from_utf8(&data).map_err(|err| err.to_string())?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(data),
                    None => return Err("CDATA outside the root element".to_string()),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, String> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|err| err.to_string())?
        .to_string();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| err.to_string())?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| err.to_string())?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(format!("second root element <{}>", element.name)),
    }
    Ok(())
}
