//! Demonstration functions available to flows run from the CLI.
//!
//! Each reads the numbered inputs `0`, `1`, ... up to the first undefined
//! one and writes `#output`.

use tickflow::{Function, FunctionContext, FunctionDesc, Graph, RunOutput, Value};

fn numbered_inputs(ctx: &FunctionContext<'_>) -> Vec<Value> {
    (0..)
        .map(|i| ctx.input(&i.to_string()))
        .take_while(|v| !v.is_undefined())
        .collect()
}

fn fold_numbers(ctx: &FunctionContext<'_>, init: f64, f: fn(f64, f64) -> f64) -> Value {
    let inputs = numbered_inputs(ctx);
    if inputs.is_empty() {
        return Value::Undefined;
    }
    inputs
        .iter()
        .try_fold(init, |acc, v| v.as_f64().map(|n| f(acc, n)))
        .map(Value::from)
        .unwrap_or(Value::Undefined)
}

#[derive(Default)]
struct Add;

impl Function for Add {
    fn run(&mut self, ctx: &mut FunctionContext<'_>) -> RunOutput {
        let sum = fold_numbers(ctx, 0.0, |a, b| a + b);
        ctx.output(sum);
        RunOutput::None
    }
}

#[derive(Default)]
struct Multiply;

impl Function for Multiply {
    fn run(&mut self, ctx: &mut FunctionContext<'_>) -> RunOutput {
        let product = fold_numbers(ctx, 1.0, |a, b| a * b);
        ctx.output(product);
        RunOutput::None
    }
}

/// Concatenates its inputs with `#separator` between them.
#[derive(Default)]
struct Join;

impl Function for Join {
    fn run(&mut self, ctx: &mut FunctionContext<'_>) -> RunOutput {
        let separator = ctx.input("#separator");
        let separator = separator.as_str().unwrap_or("");
        let parts: Vec<String> = numbered_inputs(ctx).iter().map(Value::to_string).collect();
        ctx.output(Value::from(parts.join(separator)));
        RunOutput::None
    }
}

pub fn register(graph: &mut Graph) {
    graph.register_function(FunctionDesc::of::<Add>("add"));
    graph.register_function(FunctionDesc::of::<Multiply>("multiply"));
    graph.register_function(FunctionDesc::of::<Join>("join"));
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value as Json};
    use tickflow::{DataMap, EngineConfig};

    use super::*;

    fn data(json: Json) -> DataMap {
        match json {
            Json::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn demo_functions_compute() {
        let mut graph = Graph::new(EngineConfig::strict());
        register(&mut graph);
        let job = graph.add_job("demo", &data(json!({
            "sum": {"#is": "add", "0": 1, "1": 2, "2": 3},
            "product": {"#is": "multiply", "~0": "sum.#output", "1": 2},
            "label": {"#is": "join", "#separator": "-", "0": "a", "~1": "product.#output"}
        })));
        assert!(graph.run_all(8));
        assert_eq!(graph.query_value(job, "sum.#output"), Value::from(6));
        assert_eq!(graph.query_value(job, "product.#output"), Value::from(12));
        assert_eq!(graph.query_value(job, "label.#output"), Value::from("a-12"));
    }

    #[test]
    fn non_numeric_input_gives_undefined() {
        let mut graph = Graph::new(EngineConfig::strict());
        register(&mut graph);
        let job = graph.add_job("demo", &data(json!({"sum": {"#is": "add", "0": "x", "1": 2}})));
        assert!(graph.run_all(8));
        assert_eq!(graph.query_value(job, "sum.#output"), Value::Undefined);
    }
}
