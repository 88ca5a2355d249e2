//! Request conversion: lower the inbound wire shape into
//! [`crate::content::ChatRequest`], validate, raise into the outbound wire
//! shape. Identity directions go through the same pair of steps, which is
//! what strips nulls and canonicalizes content to the target's preferred
//! form.

pub mod lower;
pub mod raise;
