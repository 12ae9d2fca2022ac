//! EVM construction helpers.

use revm::{
    inspector_handle_register,
    primitives::EnvWithHandlerCfg,
    Context, Database, Evm, EvmContext, Handler, Inspector,
};

/// Creates a new EVM with the given inspector.
#[inline]
pub fn new_evm_with_inspector<'a, DB, I>(
    db: DB,
    env: EnvWithHandlerCfg,
    inspector: I,
) -> revm::Evm<'a, I, DB>
where
    DB: Database,
    I: Inspector<DB>,
{
    let EnvWithHandlerCfg { env, handler_cfg } = env;

    let context = Context::new(EvmContext::new_with_env(db, env), inspector);
    let mut handler = Handler::new(handler_cfg);
    handler.append_handler_register_plain(inspector_handle_register);
    Evm::new(context, handler)
}

/// Prepares an environment for replaying an already-observed transaction.
///
/// The debugger re-executes transactions that were accepted on chain, so the
/// up-front validity checks (nonce, sender balance, base fee, EIP-3607) are
/// suppressed.
pub fn replay_env(mut env: EnvWithHandlerCfg) -> EnvWithHandlerCfg {
    env.tx.nonce = None;
    env.cfg.disable_balance_check = true;
    env.cfg.disable_base_fee = true;
    env.cfg.disable_eip3607 = true;
    env
}
