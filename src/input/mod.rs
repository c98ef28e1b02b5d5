//! Input-file parsing
//!
//! The solver input is a whitespace-insensitive, semicolon-terminated
//! statement file:
//!
//! ```text
//! PARAMETERS; numThreads = -1; relApproxTol = 1e-10; PARAMETERS_END;
//! INTERVAL; [-pi, pi]; [-2, 2]; INTERVAL_END;
//! FUNCTIONS;
//!     function f1, f2;
//!     variable_group x, y;
//!     f1 = sin(x) - y;
//!     f2 = x^2 + y^2 - 1;
//! FUNCTIONS_END;
//! END;
//! ```
//!
//! Numeric values, interval endpoints included, may be constant expressions
//! (`pi/2`, `-e^2`). A `variable_group` entry that names one of the defined
//! sub-functions marks a substituted dimension: the solver runs over the
//! plain variables, and after a root is found the substituted coordinate is
//! evaluated and checked against its stated interval.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::{RuntimeOptions, SolveOptions};
use crate::functions::parser::{is_valid_name, parse_expression, FunctionContext};
use crate::functions::RealFunction;
use crate::interval::Interval;
use crate::tracking::{OutputCoordinate, VariableSubstitution};
use crate::{Result, RootfieldError};

/// Everything a solve needs, extracted from one input file
pub struct ParsedInput {
    pub functions: Vec<Arc<dyn RealFunction>>,
    pub search_interval: Interval,
    pub options: SolveOptions,
    pub runtime: RuntimeOptions,
    pub substitution: VariableSubstitution,
}

/// Parse an input file from disk
pub fn parse_input_file(path: &Path) -> Result<ParsedInput> {
    let text = fs::read_to_string(path)?;
    parse_input_str(&text)
}

/// Parse input-file text
pub fn parse_input_str(text: &str) -> Result<ParsedInput> {
    // Whitespace never matters, statements end at semicolons
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut statements: Vec<&str> = compact.split(';').collect();
    // Everything after the last semicolon is ignored (usually empty)
    statements.pop();
    if statements.last() != Some(&"END") {
        return Err(RootfieldError::input("no END statement found"));
    }
    statements.pop();

    let mut cursor = 0usize;
    let mut options = SolveOptions::default();
    let mut runtime = RuntimeOptions::default();

    if statements.get(cursor) == Some(&"PARAMETERS") {
        cursor += 1;
        parse_parameters(&statements, &mut cursor, &mut options, &mut runtime)?;
    }

    if statements.get(cursor) != Some(&"INTERVAL") {
        return Err(RootfieldError::input("no INTERVAL section found"));
    }
    cursor += 1;
    let ranges = parse_interval(&statements, &mut cursor)?;

    if statements.get(cursor) != Some(&"FUNCTIONS") {
        return Err(RootfieldError::input("no FUNCTIONS section found"));
    }
    cursor += 1;
    let (functions, solver_variables, substitution) =
        parse_functions(&statements, &mut cursor, &ranges)?;

    if cursor != statements.len() {
        return Err(RootfieldError::input(format!(
            "unexpected statement '{}' after FUNCTIONS_END",
            statements[cursor]
        )));
    }

    if ranges.len() != substitution_len(&substitution) {
        return Err(RootfieldError::input(format!(
            "INTERVAL has {} ranges for {} variable_group entries",
            ranges.len(),
            substitution_len(&substitution)
        )));
    }
    if functions.len() != solver_variables.len() {
        return Err(RootfieldError::input(format!(
            "system is not square: {} functions over {} variables",
            functions.len(),
            solver_variables.len()
        )));
    }

    // Search box: the ranges belonging to plain variables, in order
    let mut lower = Vec::with_capacity(solver_variables.len());
    let mut upper = Vec::with_capacity(solver_variables.len());
    for (range, output) in ranges.iter().zip(substitution_outputs(&substitution)) {
        if let OutputCoordinate::Variable(_) = output {
            lower.push(range.0);
            upper.push(range.1);
        }
    }
    let search_interval = Interval::new(lower, upper);

    Ok(ParsedInput {
        functions,
        search_interval,
        options,
        runtime,
        substitution,
    })
}

fn substitution_len(substitution: &VariableSubstitution) -> usize {
    substitution_outputs(substitution).len()
}

fn substitution_outputs(substitution: &VariableSubstitution) -> &[OutputCoordinate] {
    substitution.outputs()
}

/// Fold a constant expression (`1e-3`, `pi/2`, `-e`) to its value
fn parse_constant(text: &str, what: &str) -> Result<f64> {
    let context = FunctionContext::default();
    let expr = parse_expression(text, &context)
        .map_err(|_| RootfieldError::input(format!("invalid numeric value '{}' for {}", text, what)))?;
    expr.constant_value().ok_or_else(|| {
        RootfieldError::input(format!("value '{}' for {} is not constant", text, what))
    })
}

fn parse_positive(text: &str, what: &str) -> Result<f64> {
    let value = parse_constant(text, what)?;
    if value < 0.0 {
        return Err(RootfieldError::input(format!("{} must be >= 0", what)));
    }
    Ok(value)
}

fn parse_bool(text: &str, what: &str) -> Result<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "y" | "yes" => Ok(true),
        "false" | "f" | "n" | "no" => Ok(false),
        other => Err(RootfieldError::input(format!(
            "invalid boolean '{}' for {}",
            other, what
        ))),
    }
}

fn parse_integer(text: &str, what: &str) -> Result<i64> {
    text.parse::<i64>()
        .map_err(|_| RootfieldError::input(format!("invalid integer '{}' for {}", text, what)))
}

fn parse_parameters(
    statements: &[&str],
    cursor: &mut usize,
    options: &mut SolveOptions,
    runtime: &mut RuntimeOptions,
) -> Result<()> {
    while let Some(&statement) = statements.get(*cursor) {
        *cursor += 1;
        if statement == "PARAMETERS_END" {
            return Ok(());
        }
        let (key, value) = statement.split_once('=').ok_or_else(|| {
            RootfieldError::input(format!("invalid parameter statement '{}'", statement))
        })?;
        match key {
            "numThreads" => {
                let requested = parse_integer(value, key)?;
                runtime.num_threads = if requested == -1 {
                    std::thread::available_parallelism()
                        .map(|n| n.get())
                        .unwrap_or(1)
                } else if requested <= 0 {
                    return Err(RootfieldError::input(format!(
                        "invalid numThreads {}",
                        requested
                    )));
                } else {
                    requested as usize
                };
            }
            "relApproxTol" => options.rel_approx_tol = parse_positive(value, key)?,
            "absApproxTol" => options.abs_approx_tol = parse_positive(value, key)?,
            "targetTol" => options.target_tol = parse_positive(value, key)?,
            "goodZerosFactor" => options.good_zeros_factor = parse_positive(value, key)?,
            "minGoodZerosTol" => options.min_good_zeros_tol = parse_positive(value, key)?,
            "approximationDegree" => {
                let degree = parse_integer(value, key)?;
                if degree < 1 {
                    return Err(RootfieldError::input("approximationDegree must be >= 1"));
                }
                options.approximation_degree = degree as usize;
            }
            "maxLevel" => {
                let level = parse_integer(value, key)?;
                if level < 0 {
                    return Err(RootfieldError::input("maxLevel must be >= 0"));
                }
                options.max_level = level as usize;
            }
            "trackIntervals" => runtime.track_intervals = parse_bool(value, key)?,
            "trackProgress" => runtime.track_progress = parse_bool(value, key)?,
            "useTimer" => runtime.use_timer = parse_bool(value, key)?,
            "computeResiduals" => runtime.compute_residuals = parse_bool(value, key)?,
            other => {
                return Err(RootfieldError::input(format!(
                    "unrecognized parameter '{}'",
                    other
                )))
            }
        }
    }
    Err(RootfieldError::input("no PARAMETERS_END found"))
}

fn parse_interval(statements: &[&str], cursor: &mut usize) -> Result<Vec<(f64, f64)>> {
    let mut ranges = Vec::new();
    while let Some(&statement) = statements.get(*cursor) {
        *cursor += 1;
        if statement == "INTERVAL_END" {
            return Ok(ranges);
        }
        let inner = statement
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| {
                RootfieldError::input(format!("invalid interval statement '{}'", statement))
            })?;
        let parts = split_top_level(inner);
        if parts.len() != 2 {
            return Err(RootfieldError::input(format!(
                "interval '{}' should have exactly two endpoints",
                statement
            )));
        }
        let lower = parse_constant(parts[0], "interval lower bound")?;
        let upper = parse_constant(parts[1], "interval upper bound")?;
        if !(lower < upper) {
            return Err(RootfieldError::input(format!(
                "empty interval [{}, {}]",
                lower, upper
            )));
        }
        ranges.push((lower, upper));
    }
    Err(RootfieldError::input("no INTERVAL_END found"))
}

/// Split on commas outside parentheses
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

type ParsedFunctions = (
    Vec<Arc<dyn RealFunction>>,
    Vec<String>,
    VariableSubstitution,
);

fn parse_functions(
    statements: &[&str],
    cursor: &mut usize,
    ranges: &[(f64, f64)],
) -> Result<ParsedFunctions> {
    let names_statement = statements
        .get(*cursor)
        .and_then(|s| s.strip_prefix("function"))
        .ok_or_else(|| RootfieldError::input("function name list not found"))?;
    let function_names: Vec<&str> = split_top_level(names_statement);
    *cursor += 1;

    let group_statement = statements
        .get(*cursor)
        .and_then(|s| s.strip_prefix("variable_group"))
        .ok_or_else(|| RootfieldError::input("variable_group not found"))?;
    let group_entries: Vec<&str> = split_top_level(group_statement);
    *cursor += 1;

    // Collect definition statements up to FUNCTIONS_END
    let mut definitions: Vec<(&str, &str)> = Vec::new();
    let mut found_end = false;
    while let Some(&statement) = statements.get(*cursor) {
        *cursor += 1;
        if statement == "FUNCTIONS_END" {
            found_end = true;
            break;
        }
        let (name, body) = statement.split_once('=').ok_or_else(|| {
            RootfieldError::input(format!("invalid function definition '{}'", statement))
        })?;
        definitions.push((name, body));
    }
    if !found_end {
        return Err(RootfieldError::input("no FUNCTIONS_END found"));
    }

    // A group entry naming a defined sub-function is a substituted dimension
    let defined: Vec<&str> = definitions.iter().map(|(name, _)| *name).collect();
    let solver_variables: Vec<String> = group_entries
        .iter()
        .copied()
        .filter(|entry| !defined.contains(entry))
        .map(str::to_string)
        .collect();
    for entry in &group_entries {
        if !defined.contains(entry) && !is_valid_name(entry) {
            return Err(RootfieldError::input(format!(
                "illegal variable name '{}'",
                entry
            )));
        }
    }

    let mut context = FunctionContext::new(&solver_variables)?;
    for (name, body) in &definitions {
        context.define(name, body)?;
    }

    let mut functions: Vec<Arc<dyn RealFunction>> = Vec::with_capacity(function_names.len());
    for name in &function_names {
        let expression = context.expression(name)?;
        functions.push(Arc::new(expression));
    }

    // Output mapping, one coordinate per group entry
    if ranges.len() != group_entries.len() {
        return Err(RootfieldError::input(format!(
            "INTERVAL has {} ranges for {} variable_group entries",
            ranges.len(),
            group_entries.len()
        )));
    }
    let mut outputs = Vec::with_capacity(group_entries.len());
    let mut solver_index = 0usize;
    for (entry, range) in group_entries.iter().zip(ranges.iter()) {
        if defined.contains(entry) {
            outputs.push(OutputCoordinate::Substituted {
                function: Arc::new(context.expression(entry)?),
                lower: range.0,
                upper: range.1,
            });
        } else {
            outputs.push(OutputCoordinate::Variable(solver_index));
            solver_index += 1;
        }
    }

    Ok((
        functions,
        solver_variables,
        VariableSubstitution::new(outputs),
    ))
}
