//! Property tests for the canonical replica format and ledger paging.

mod canonical_props;
mod ledger_props;
