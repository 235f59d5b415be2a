use itertools::Itertools;

use super::{Scalar, Value};

/// Renders a number the APL way: `¯` for negatives, at most `precision`
/// significant digits, no trailing zeros.
pub fn format_number(x: f64, precision: usize) -> String {
    if x.is_nan() {
        return "NaN".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "∞".into() } else { "¯∞".into() };
    }
    let precision = precision.max(1);
    let magnitude = if x == 0.0 {
        0
    } else {
        x.abs().log10().floor() as i64
    };
    let text = if magnitude >= precision as i64 || magnitude < -6 {
        let s = format!("{:.*E}", precision - 1, x.abs());
        let (mantissa, exponent) = s.split_once('E').unwrap_or((&s, "0"));
        let exponent = exponent.replace('-', "¯");
        format!("{}E{}", trim_zeros(mantissa), exponent)
    } else {
        let decimals = (precision as i64 - 1 - magnitude).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, x.abs())).to_string()
    };
    if x < 0.0 {
        format!("¯{text}")
    } else {
        text
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn format_cell(cell: &Scalar, precision: usize) -> String {
    match cell {
        Scalar::Int(i) if *i < 0 => format!("¯{}", i.unsigned_abs()),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => format_number(*f, precision),
        Scalar::Char(c) => c.to_string(),
        Scalar::Nested(v) => format_value(v, precision).lines().join(" "),
    }
}

/// Renders a value as display lines joined by newlines.
pub fn format_value(value: &Value, precision: usize) -> String {
    let ravel = value.ravel();
    match value.rank() {
        0 => format_cell(&ravel[0], precision),
        1 => format_row(&ravel, precision),
        _ => {
            let cols = *value.shape().last().unwrap_or(&0);
            let rows = if cols == 0 { 0 } else { ravel.len() / cols };
            let plane: usize = value.shape()[value.rank() - 2..].iter().product();
            let texts: Vec<String> = ravel.iter().map(|c| format_cell(c, precision)).collect();
            let chars_only = ravel.iter().all(Scalar::is_char);
            let widths: Vec<usize> = (0..cols)
                .map(|c| {
                    (0..rows)
                        .map(|r| texts[r * cols + c].chars().count())
                        .max()
                        .unwrap_or(0)
                })
                .collect();
            let mut lines = Vec::with_capacity(rows);
            for r in 0..rows {
                if r > 0 && plane > 0 && (r * cols) % plane == 0 {
                    lines.push(String::new());
                }
                let line = (0..cols)
                    .map(|c| {
                        let text = &texts[r * cols + c];
                        let pad = widths[c] - text.chars().count();
                        format!("{}{}", " ".repeat(pad), text)
                    })
                    .join(if chars_only { "" } else { " " });
                lines.push(line);
            }
            lines.join("\n")
        }
    }
}

fn format_row(cells: &[Scalar], precision: usize) -> String {
    if cells.iter().all(Scalar::is_char) {
        return cells.iter().map(|c| format_cell(c, precision)).collect();
    }
    if cells.iter().any(Scalar::is_nested) {
        let items = cells.iter().map(|c| format_cell(c, precision)).join("  ");
        return format!(" {items}");
    }
    cells.iter().map(|c| format_cell(c, precision)).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueRegistry;
    use expect_test::expect;

    #[test]
    fn numbers() {
        assert_eq!(format_number(-2.5, 10), "¯2.5");
        assert_eq!(format_number(1.0 / 3.0, 10), "0.3333333333");
        assert_eq!(format_number(1e20, 10), "1E20");
        assert_eq!(format_number(0.0, 10), "0");
    }

    #[test]
    fn matrix_alignment() {
        let mut reg = ValueRegistry::new();
        let m = reg
            .make(
                vec![2, 3],
                [1, 20, 3, -4, 5, 600].map(Scalar::Int).to_vec(),
            )
            .unwrap();
        expect![[r#"
             1 20   3
            ¯4  5 600"#]]
        .assert_eq(&format_value(&m, 10));
    }

    #[test]
    fn nested_vector() {
        let mut reg = ValueRegistry::new();
        let a = reg.vector(vec![Scalar::Int(1), Scalar::Int(2)]);
        let b = reg.chars("ab");
        let v = reg.vector(vec![Scalar::Nested(a), Scalar::Nested(b)]);
        assert_eq!(format_value(&v, 10), " 1 2  ab");
    }
}
