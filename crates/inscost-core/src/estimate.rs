//! Fixed-coefficient charge estimate.
//!
//! This is a flat formula, not a fitted model: every coefficient is a
//! constant below.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const BASE: f64 = 2000.0;
const PER_AGE: f64 = 250.0;
const PER_BMI: f64 = 350.0;
const PER_CHILD: f64 = 400.0;
const SMOKER: f64 = 12000.0;
const FEMALE: f64 = -500.0;

fn region_coefficient(region: &str) -> f64 {
  match region {
    "southeast" => 1000.0,
    "southwest" => 500.0,
    "northwest" => 700.0,
    "northeast" => 800.0,
    _ => 0.0,
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateInput {
  pub age:      u32,
  pub sex:      String,
  pub bmi:      f64,
  pub children: u32,
  pub smoker:   bool,
  pub region:   String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
  /// Estimated yearly charges.
  pub charges:         f64,
  /// What the charges would be without the smoker surcharge; `None` for
  /// non-smokers.
  pub if_quit_smoking: Option<f64>,
}

impl Estimate {
  pub fn smoking_surcharge(&self) -> f64 {
    self.if_quit_smoking.map_or(0.0, |quit| self.charges - quit)
  }
}

fn check<T: PartialOrd + ToString>(
  field: &'static str,
  value: T,
  lo: T,
  hi: T,
  expected: &'static str,
) -> Result<()> {
  if value < lo || value > hi {
    return Err(Error::OutOfRangeValue { field, value: value.to_string(), expected });
  }
  Ok(())
}

/// Accept `region` if it matches one of `known` (case-insensitively), or if
/// `known` is empty.
pub fn check_region(known: &[String], region: &str) -> Result<()> {
  if known.is_empty() || known.iter().any(|k| k.eq_ignore_ascii_case(region)) {
    return Ok(());
  }
  Err(Error::OutOfRangeValue {
    field:    "region",
    value:    format!("{region:?}"),
    expected: "a region present in the warehouse",
  })
}

pub fn estimate(input: &EstimateInput) -> Result<Estimate> {
  if !input.bmi.is_finite() {
    return Err(Error::OutOfRangeValue {
      field:    "bmi",
      value:    input.bmi.to_string(),
      expected: "a finite number in 10.0..=60.0",
    });
  }
  check("age", input.age, 18, 100, "18..=100")?;
  check("bmi", input.bmi, 10.0, 60.0, "10.0..=60.0")?;
  check("children", input.children, 0, 10, "0..=10")?;

  let sex = if input.sex.eq_ignore_ascii_case("female") { FEMALE } else { 0.0 };
  let without_smoking = BASE
    + PER_AGE * (f64::from(input.age) / 50.0)
    + PER_BMI * (input.bmi / 30.0)
    + PER_CHILD * f64::from(input.children)
    + sex
    + region_coefficient(&input.region.to_ascii_lowercase());

  Ok(if input.smoker {
    Estimate {
      charges:         without_smoking + SMOKER,
      if_quit_smoking: Some(without_smoking),
    }
  } else {
    Estimate { charges: without_smoking, if_quit_smoking: None }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn input() -> EstimateInput {
    EstimateInput {
      age:      30,
      sex:      "male".into(),
      bmi:      25.0,
      children: 0,
      smoker:   false,
      region:   "northeast".into(),
    }
  }

  fn close(a: f64, b: f64) -> bool { (a - b).abs() < 1e-9 }

  #[test]
  fn default_form_values() {
    // 2000 + 250*0.6 + 350*(25/30) + 0 + 0 + 800
    let est = estimate(&input()).unwrap();
    assert!(close(est.charges, 2000.0 + 150.0 + 350.0 * 25.0 / 30.0 + 800.0));
    assert_eq!(est.if_quit_smoking, None);
    assert_eq!(est.smoking_surcharge(), 0.0);
  }

  #[test]
  fn smoker_female_with_children() {
    let est = estimate(&EstimateInput {
      age:      50,
      sex:      "female".into(),
      bmi:      30.0,
      children: 2,
      smoker:   true,
      region:   "southeast".into(),
    })
    .unwrap();
    let without = 2000.0 + 250.0 + 350.0 + 800.0 - 500.0 + 1000.0;
    assert!(close(est.charges, without + 12000.0));
    assert!(close(est.if_quit_smoking.unwrap(), without));
    assert!(close(est.smoking_surcharge(), 12000.0));
  }

  #[test]
  fn unknown_region_adds_nothing() {
    let mut a = input();
    a.region = "midwest".into();
    let mut b = input();
    b.region = "northeast".into();
    assert!(close(estimate(&b).unwrap().charges - estimate(&a).unwrap().charges, 800.0));
  }

  #[test]
  fn inputs_outside_form_bounds_are_rejected() {
    let mut young = input();
    young.age = 17;
    assert!(matches!(estimate(&young), Err(Error::OutOfRangeValue { field: "age", .. })));

    let mut heavy = input();
    heavy.bmi = 61.0;
    assert!(matches!(estimate(&heavy), Err(Error::OutOfRangeValue { field: "bmi", .. })));

    let mut many = input();
    many.children = 11;
    assert!(matches!(
      estimate(&many),
      Err(Error::OutOfRangeValue { field: "children", .. })
    ));
  }

  #[test]
  fn non_finite_bmi_is_rejected() {
    for bmi in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
      let mut odd = input();
      odd.bmi = bmi;
      assert!(
        matches!(estimate(&odd), Err(Error::OutOfRangeValue { field: "bmi", .. })),
        "{bmi}"
      );
    }
  }

  #[test]
  fn region_must_be_known_once_the_warehouse_has_regions() {
    let known = vec!["northeast".to_owned(), "Southwest".to_owned()];
    assert!(check_region(&known, "northeast").is_ok());
    assert!(check_region(&known, "SOUTHWEST").is_ok());
    assert!(matches!(
      check_region(&known, "midwest"),
      Err(Error::OutOfRangeValue { field: "region", .. })
    ));
    assert!(check_region(&[], "midwest").is_ok());
  }
}
