//! Formulas backing calculated properties

use std::error::Error as _;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use tera::ast::{ExprVal, Node};
use tera::{Context, Tera};
use tracing::warn;

use crate::core::error::{ModelError, Result};
use crate::core::value::{PropertyName, Value};

/// Read access to the current values of one property scope
pub trait ValueLookup {
    /// Current value of `name`, `Value::Null` if it is not declared
    fn value_of(&self, name: &str) -> Value;
}

impl ValueLookup for crate::core::value::PropertyValues {
    fn value_of(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_default()
    }
}

type CustomFn = Arc<dyn Fn(&dyn ValueLookup) -> Value + Send + Sync>;

/// A pure function of other properties of the same scope
#[derive(Clone)]
pub enum Formula {
    /// Sum of the inputs; missing inputs are skipped
    Sum(Vec<PropertyName>),
    /// Product of the inputs; a missing input counts as zero
    Product(Vec<PropertyName>),
    /// Text with `{{ Name }}` placeholders
    Template(TextTemplate),
    /// Caller-supplied computation over declared inputs
    Custom {
        inputs: Vec<PropertyName>,
        func: CustomFn,
    },
}

impl Formula {
    pub fn sum<I, N>(inputs: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
    {
        Formula::Sum(inputs.into_iter().map(Into::into).collect())
    }

    pub fn product<I, N>(inputs: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
    {
        Formula::Product(inputs.into_iter().map(Into::into).collect())
    }

    pub fn template(source: &str) -> Result<Self> {
        TextTemplate::parse(source).map(Formula::Template)
    }

    pub fn custom<I, N, F>(inputs: I, func: F) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
        F: Fn(&dyn ValueLookup) -> Value + Send + Sync + 'static,
    {
        Formula::Custom {
            inputs: inputs.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
        }
    }

    /// Names this formula reads
    pub fn inputs(&self) -> Vec<PropertyName> {
        match self {
            Formula::Sum(names) | Formula::Product(names) => names.clone(),
            Formula::Template(template) => template.inputs().to_vec(),
            Formula::Custom { inputs, .. } => inputs.clone(),
        }
    }

    pub fn evaluate(&self, scope: &dyn ValueLookup) -> Value {
        match self {
            Formula::Sum(names) => fold_numbers(names, scope, Operation::Add),
            Formula::Product(names) => fold_numbers(names, scope, Operation::Multiply),
            Formula::Template(template) => template.render(scope),
            Formula::Custom { func, .. } => func(scope),
        }
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Sum(names) => f.debug_tuple("Sum").field(names).finish(),
            Formula::Product(names) => f.debug_tuple("Product").field(names).finish(),
            Formula::Template(template) => {
                f.debug_tuple("Template").field(&template.source()).finish()
            }
            Formula::Custom { inputs, .. } => {
                f.debug_struct("Custom").field("inputs", inputs).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Operation {
    Add,
    Multiply,
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Dec(Decimal),
}

impl Number {
    fn as_decimal(self) -> Decimal {
        match self {
            Number::Int(i) => Decimal::from(i),
            Number::Dec(d) => d,
        }
    }

    fn combine(self, other: Number, op: Operation) -> Option<Number> {
        match (self, other, op) {
            (Number::Int(a), Number::Int(b), Operation::Add) => a.checked_add(b).map(Number::Int),
            (Number::Int(a), Number::Int(b), Operation::Multiply) => {
                a.checked_mul(b).map(Number::Int)
            }
            (a, b, Operation::Add) => a.as_decimal().checked_add(b.as_decimal()).map(Number::Dec),
            (a, b, Operation::Multiply) => {
                a.as_decimal().checked_mul(b.as_decimal()).map(Number::Dec)
            }
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Integer(i),
            Number::Dec(d) => Value::Decimal(d),
        }
    }
}

fn fold_numbers(names: &[PropertyName], scope: &dyn ValueLookup, op: Operation) -> Value {
    let mut acc: Option<Number> = None;
    let mut missing = false;
    for name in names {
        let number = match scope.value_of(name.as_str()) {
            Value::Null => {
                missing = true;
                continue;
            }
            Value::Integer(i) => Number::Int(i),
            Value::Decimal(d) => Number::Dec(d),
            other => {
                warn!("Ignoring non-numeric input {}={:?}", name, other);
                continue;
            }
        };
        acc = match acc {
            None => Some(number),
            Some(current) => match current.combine(number, op) {
                Some(result) => Some(result),
                None => {
                    warn!("Numeric overflow while evaluating formula over {:?}", names);
                    return Value::Null;
                }
            },
        };
    }
    match (acc, op) {
        // An unknown factor makes the product zero
        (Some(_), Operation::Multiply) if missing => Value::Integer(0),
        (acc, _) => acc.map(Number::into_value).unwrap_or(Value::Null),
    }
}

const TEMPLATE_NAME: &str = "formula";

/// A compiled text template with `{{ Name }}` placeholders
#[derive(Clone)]
pub struct TextTemplate {
    source: String,
    inputs: Vec<PropertyName>,
    tera: Tera,
}

impl TextTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, source)
            .map_err(|e| template_error(source, &e))?;
        let mut inputs = Vec::new();
        if let Ok(template) = tera.get_template(TEMPLATE_NAME) {
            collect_inputs(&template.ast, &mut inputs);
        }
        Ok(Self {
            source: source.to_string(),
            inputs,
            tera,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the variables the template prints, in order of appearance
    pub fn inputs(&self) -> &[PropertyName] {
        &self.inputs
    }

    /// Render with the display text of each input; a blank result is Null
    pub fn render(&self, scope: &dyn ValueLookup) -> Value {
        let mut context = Context::new();
        for name in &self.inputs {
            context.insert(name.as_str(), &scope.value_of(name.as_str()).to_string());
        }
        match self.tera.render(TEMPLATE_NAME, &context) {
            Ok(rendered) if rendered.trim().is_empty() => Value::Null,
            Ok(rendered) => Value::Text(rendered.trim().to_string()),
            Err(e) => {
                warn!("Failed to render template {:?}: {}", self.source, e);
                Value::Null
            }
        }
    }
}

impl fmt::Debug for TextTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextTemplate").field(&self.source).finish()
    }
}

fn collect_inputs(nodes: &[Node], inputs: &mut Vec<PropertyName>) {
    for node in nodes {
        let Node::VariableBlock(_, expr) = node else {
            continue;
        };
        if let ExprVal::Ident(ident) = &expr.val {
            let name = ident.split('.').next().unwrap_or(ident.as_str());
            if !inputs.iter().any(|n| n.as_str() == name) {
                inputs.push(PropertyName::from(name));
            }
        }
    }
}

fn template_error(source: &str, error: &tera::Error) -> ModelError {
    let mut message = error.to_string();
    let mut cause = error.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    ModelError::Template {
        template: source.to_string(),
        message,
    }
}
