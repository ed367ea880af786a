use super::*;

/// # Safety
/// Only this module touches the `LLM_*` variables, and it does so from a
/// single test so the steps cannot interleave.
unsafe fn clear_llm_env() {
    unsafe {
        std::env::remove_var("LLM_MODEL");
        std::env::remove_var("LLM_API_KEY_ENV");
        std::env::remove_var("LLM_OPENAI_MODE");
        std::env::remove_var("LLM_OPENAI_BASE_URL");
        std::env::remove_var("LLM_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("LLM_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("__SECRETARY_TEST_LLM_KEY__");
    }
}

#[test]
fn from_env_defaults_overrides_and_errors() {
    unsafe { clear_llm_env() };
    let err = LlmConfig::from_env().unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { ref var } if var == "LLM_API_KEY_ENV"));

    unsafe { std::env::set_var("LLM_API_KEY_ENV", "__SECRETARY_TEST_LLM_KEY__") };
    let err = LlmConfig::from_env().unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { ref var } if var == "__SECRETARY_TEST_LLM_KEY__"));

    unsafe { std::env::set_var("__SECRETARY_TEST_LLM_KEY__", "sk-test") };
    let cfg = LlmConfig::from_env().unwrap();
    assert_eq!(cfg.api_key, "sk-test");
    assert_eq!(cfg.model, DEFAULT_LLM_MODEL);
    assert_eq!(cfg.openai_mode, OpenAiApiMode::ChatCompletions);
    assert_eq!(cfg.openai_base_url, DEFAULT_OPENAI_BASE_URL);
    assert_eq!(
        cfg.timeouts,
        LlmTimeouts { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    );

    unsafe {
        std::env::set_var("LLM_MODEL", "gpt-4-turbo-preview");
        std::env::set_var("LLM_OPENAI_MODE", "responses");
        std::env::set_var("LLM_OPENAI_BASE_URL", "https://gateway.test/v1/");
        std::env::set_var("LLM_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("LLM_CONNECT_TIMEOUT_SECS", "not-a-number");
    }
    let cfg = LlmConfig::from_env().unwrap();
    assert_eq!(cfg.model, "gpt-4-turbo-preview");
    assert_eq!(cfg.openai_mode, OpenAiApiMode::Responses);
    assert_eq!(cfg.openai_base_url, "https://gateway.test/v1");
    assert_eq!(cfg.timeouts, LlmTimeouts { request_secs: 42, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS });

    unsafe { std::env::set_var("LLM_OPENAI_MODE", "bad_mode") };
    let err = LlmConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("unsupported openai_api mode"));

    unsafe { clear_llm_env() };
}

#[test]
fn parse_openai_mode_defaults_to_chat_completions() {
    assert_eq!(parse_openai_mode(None).unwrap(), OpenAiApiMode::ChatCompletions);
    assert_eq!(parse_openai_mode(Some("responses")).unwrap(), OpenAiApiMode::Responses);
    assert!(parse_openai_mode(Some("completions")).is_err());
}
