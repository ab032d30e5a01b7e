use crate::{CaseOutcome, JunitCase, JunitError, JunitReport};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Detail,
    SystemOut,
}

/// Parse a JUnit XML document (`<testsuites>` or a bare `<testsuite>`).
pub fn parse_str(xml: &str) -> Result<JunitReport, JunitError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut report = JunitReport::default();
    let mut suites: Vec<String> = Vec::new();
    let mut case: Option<JunitCase> = None;
    let mut capture = Capture::None;
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| JunitError::Xml {
            position: reader.error_position() as u64,
            source: e,
        })?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"testsuite" => suites.push(attr(&e, b"name")?.unwrap_or_default()),
                b"testcase" => {
                    if case.is_some() {
                        return Err(JunitError::Malformed("nested <testcase>".into()));
                    }
                    case = Some(open_case(&e, &suites)?);
                }
                b"failure" | b"error" | b"skipped" => {
                    if let Some(c) = case.as_mut() {
                        apply_outcome(c, &e)?;
                        capture = Capture::Detail;
                        text.clear();
                    }
                }
                b"system-out" | b"system-err" => {
                    if case.is_some() {
                        capture = Capture::SystemOut;
                        text.clear();
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"testsuite" => {}
                b"testcase" => {
                    if case.is_some() {
                        return Err(JunitError::Malformed("nested <testcase>".into()));
                    }
                    report.cases.push(open_case(&e, &suites)?);
                }
                b"failure" | b"error" | b"skipped" => {
                    if let Some(c) = case.as_mut() {
                        apply_outcome(c, &e)?;
                    }
                }
                b"property" => {
                    if let Some(c) = case.as_mut() {
                        let name = attr(&e, b"name")?.unwrap_or_default();
                        let value = attr(&e, b"value")?.unwrap_or_default();
                        c.properties.push((name, value));
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if capture != Capture::None {
                    let unescaped = t.unescape().map_err(|e| JunitError::Xml {
                        position: reader.buffer_position() as u64,
                        source: e,
                    })?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if capture != Capture::None {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"testsuite" => {
                    suites.pop();
                }
                b"testcase" => {
                    if let Some(c) = case.take() {
                        report.cases.push(c);
                    }
                    capture = Capture::None;
                }
                b"failure" | b"error" | b"skipped" => {
                    if capture == Capture::Detail {
                        if let Some(c) = case.as_mut()
                            && !text.trim().is_empty()
                        {
                            c.details = Some(text.trim().to_string());
                        }
                        capture = Capture::None;
                    }
                }
                b"system-out" | b"system-err" => {
                    if capture == Capture::SystemOut {
                        if let Some(c) = case.as_mut()
                            && !text.trim().is_empty()
                        {
                            let out = c.system_out.get_or_insert_with(String::new);
                            if !out.is_empty() {
                                out.push('\n');
                            }
                            out.push_str(text.trim());
                        }
                        capture = Capture::None;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if case.is_some() {
        return Err(JunitError::Malformed("unterminated <testcase>".into()));
    }
    Ok(report)
}

fn open_case(e: &BytesStart<'_>, suites: &[String]) -> Result<JunitCase, JunitError> {
    let name = attr(e, b"name")?
        .filter(|n| !n.is_empty())
        .ok_or_else(|| JunitError::Malformed("<testcase> without a name".into()))?;
    Ok(JunitCase {
        suite: suites.last().cloned().unwrap_or_default(),
        classname: attr(e, b"classname")?.filter(|c| !c.is_empty()),
        name,
        time_secs: attr(e, b"time")?.and_then(|t| t.trim().parse::<f64>().ok()),
        outcome: CaseOutcome::Passed,
        message: None,
        details: None,
        system_out: None,
        properties: Vec::new(),
    })
}

fn apply_outcome(case: &mut JunitCase, e: &BytesStart<'_>) -> Result<(), JunitError> {
    let outcome = match e.local_name().as_ref() {
        b"failure" => CaseOutcome::Failed,
        b"error" => CaseOutcome::Errored,
        _ => CaseOutcome::Skipped,
    };
    // a failure recorded alongside an error keeps the first verdict
    if case.outcome == CaseOutcome::Passed {
        case.outcome = outcome;
        case.message = attr(e, b"message")?.filter(|m| !m.is_empty());
    }
    Ok(())
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, JunitError> {
    for a in e.attributes() {
        let a = a.map_err(|err| JunitError::Malformed(format!("bad attribute: {err}")))?;
        if a.key.local_name().as_ref() == key {
            let value = a
                .unescape_value()
                .map_err(|err| JunitError::Malformed(format!("bad attribute value: {err}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
