// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Fabrica - toolkit for Kubernetes-shaped REST services
//!
//! Fabrica is a library for building REST services whose resources follow
//! the Kubernetes resource envelope (`apiVersion`/`kind`/`metadata`/`spec`/
//! `status`), with multi-version schema negotiation, conditional HTTP
//! requests, three PATCH dialects, an in-process CloudEvents bus, a
//! reconciliation controller, and a pluggable RBAC policy engine.
//!
//! ## Modules
//!
//! - [`resource`] - the resource envelope, conditions, and kind registry
//! - [`validation`] - declarative and capability-based validation
//! - [`version_registry`] - multi-version schema negotiation and conversion
//! - [`storage`] - file-backed, kind/uid-addressed persistence
//! - [`conditional`] - RFC 7232 conditional-request evaluation
//! - [`patch`] - merge-patch, JSON Patch, and shorthand-patch dialects
//! - [`events`] - the CloudEvents bus and lifecycle/condition bridge
//! - [`reconcile`] - the reconciliation controller
//! - [`policy`] - the RBAC policy engine
//! - [`http`] - the axum-based HTTP surface
//! - [`context`] - shared application state
//! - [`metrics`] - Prometheus metrics
//! - [`config`] - layered configuration
//! - [`errors`] - the error-kind taxonomy and its HTTP mapping
//!
//! For more information, see the [documentation](https://firestoned.github.io/fabrica/).

pub mod conditional;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod events;
pub mod http;
pub mod metrics;
pub mod patch;
pub mod policy;
pub mod reconcile;
pub mod resource;
pub mod storage;
pub mod validation;
pub mod version_registry;
