/*! Tests for layout, lowering and devirtualization.
 *
 * Programs are assembled with the builder API and lowered through a session, so these cases
 * check the same paths front ends use.
 */

#![allow(unused_imports)]
#![allow(unused_variables)]

mod interface_tests;
mod memory_tests;
mod vtable_tests;
