//! Pipeline stages for nutrition-label extraction.
//!
//! Each submodule implements exactly one transformation step and is a pure
//! function of its inputs, so every stage can be tested on hand-built data.
//!
//! ## Data Flow
//!
//! ```text
//! tokens ──▶ lines ──▶ noise ──▶ candidates ──▶ label ──▶ rows ─────┐
//! (ocr.rs)  (y-cluster) (boilerplate) (value+unit) (left scan) (group) │
//!    │                                                                ▼
//!    └──▶ columns (dual layout) ──▶ rules (plain text) ──▶ nutrients ──▶ LabelData
//!                                            serving ──────────┘
//! ```
//!
//! 1. [`lines`]      cluster tokens into reading-order lines
//! 2. [`noise`]      flag %DV tables, footnotes and column headers
//! 3. [`candidates`] find `value + unit` readings on the surviving lines
//! 4. [`label`]      attach the label phrase left of each reading
//! 5. [`rows`]       one row per label with a deterministic primary reading
//! 6. [`columns`]    split dual-column labels into per-serve / per-100g bands
//! 7. [`rules`]      declarative line rules for labels without usable geometry
//! 8. [`serving`]    serving size and servings per pack
//! 9. [`nutrients`]  cross-validate, merge sources, veto implausible values
//!
//! [`text`] holds the normalisation and unit grammar shared by all of them.

pub mod candidates;
pub mod columns;
pub mod label;
pub mod lines;
pub mod noise;
pub mod nutrients;
pub mod rows;
pub mod rules;
pub mod serving;
pub mod text;
