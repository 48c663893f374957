use crate::error::AppError;
use std::env;
use url::Url;

/// Default port the Express predecessor listened on; kept for drop-in deploys.
const DEFAULT_PORT: u16 = 8017;
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_FPT_TTS_URL: &str = "https://api.fpt.ai/hmi/tts/v5";
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo-1106";
const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
const DEFAULT_DEV_ORIGIN: &str = "http://localhost:5173";

/// Credentials for the Cloudinary media account used by document ingestion.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Upload API root; overridable so tests can point at a mock server.
    pub base_url: String,
}

/// All runtime configuration, resolved once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// "dev" or "production"; decides the CORS origin.
    pub build_mode: String,
    pub client_origin: String,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub default_chat_model: String,

    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub embedding_model: String,

    pub supabase_url: String,
    pub supabase_api_key: String,

    pub cloudinary: Option<CloudinaryConfig>,

    pub fpt_tts_api_key: Option<String>,
    pub fpt_tts_voice: String,
    pub fpt_tts_url: String,
    /// Public base URL of this server, used as the async TTS callback target.
    pub callback_base_url: Option<String>,

    pub tts_model: String,
    pub tts_voice: String,

    /// Where the assistant sends users it cannot help.
    pub contact_email: String,
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Config(format!("Missing required environment variable: {}", key)))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Reads every setting from the environment. Call `dotenv::dotenv()`
    /// before this so a local `.env` file is honored.
    pub fn from_env() -> Result<Self, AppError> {
        let port = match optional("APP_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("APP_PORT is not a valid port: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        let supabase_url = required("SUPABASE_URL")?;
        Url::parse(&supabase_url)
            .map_err(|e| AppError::Config(format!("SUPABASE_URL is not a valid URL: {}", e)))?;

        let cloudinary = match (
            optional("CLOUDINARY_CLOUD_NAME"),
            optional("CLOUDINARY_API_KEY"),
            optional("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                base_url: optional("CLOUDINARY_BASE_URL")
                    .unwrap_or_else(|| "https://api.cloudinary.com/v1_1".to_string()),
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "Cloudinary configuration is incomplete: set all of CLOUDINARY_CLOUD_NAME, \
                     CLOUDINARY_API_KEY, CLOUDINARY_API_SECRET or none of them"
                        .to_string(),
                ))
            }
        };

        Ok(Self {
            host: optional("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            build_mode: optional("BUILD_MODE").unwrap_or_else(|| "dev".to_string()),
            client_origin: optional("CLIENT_ORIGIN")
                .unwrap_or_else(|| DEFAULT_DEV_ORIGIN.to_string()),
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string()),
            groq_api_key: optional("GROQ_API_KEY"),
            groq_base_url: optional("GROQ_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GROQ_BASE.to_string()),
            default_chat_model: optional("CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_base_url: optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE.to_string()),
            embedding_model: optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            supabase_url,
            supabase_api_key: required("SUPABASE_API_KEY")?,
            cloudinary,
            fpt_tts_api_key: optional("FPT_TTS_API_KEY"),
            fpt_tts_voice: optional("FPT_TTS_VOICE").unwrap_or_else(|| "banmai".to_string()),
            fpt_tts_url: optional("FPT_TTS_URL").unwrap_or_else(|| DEFAULT_FPT_TTS_URL.to_string()),
            callback_base_url: optional("CALLBACK_BASE_URL"),
            tts_model: optional("TTS_MODEL").unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: optional("TTS_VOICE").unwrap_or_else(|| "alloy".to_string()),
            contact_email: optional("ADMISSIONS_CONTACT_EMAIL")
                .unwrap_or_else(|| "tuyensinh@admichat.edu.vn".to_string()),
        })
    }

    /// The origin the browser client is served from. In dev that is the
    /// local Vite server; in production the configured client origin.
    pub fn allowed_origin(&self) -> &str {
        if self.build_mode == "dev" {
            DEFAULT_DEV_ORIGIN
        } else {
            &self.client_origin
        }
    }

    /// Routes a chat model name to the (base_url, api_key) pair serving it.
    /// `gpt-*` models go to OpenAI; everything else (mixtral, llama, gemma)
    /// goes to the Groq-compatible endpoint.
    pub fn provider_for_model(&self, model: &str) -> Result<(&str, &str), AppError> {
        if model.starts_with("gpt-") {
            Ok((&self.openai_base_url, &self.openai_api_key))
        } else {
            let key = self.groq_api_key.as_deref().ok_or_else(|| {
                AppError::Config(format!(
                    "Model {} requires GROQ_API_KEY, which is not set",
                    model
                ))
            })?;
            Ok((&self.groq_base_url, key))
        }
    }

    pub fn cloudinary(&self) -> Result<&CloudinaryConfig, AppError> {
        self.cloudinary.as_ref().ok_or_else(|| {
            AppError::Config("Cloudinary is not configured (required for document ingestion)".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_minimal_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-test")),
                ("GEMINI_API_KEY", Some("gm-test")),
                ("SUPABASE_URL", Some("https://project.supabase.co")),
                ("SUPABASE_API_KEY", Some("sb-test")),
                ("GROQ_API_KEY", Some("gq-test")),
            ],
            f,
        );
    }

    #[test]
    fn loads_with_defaults() {
        with_minimal_env(|| {
            let config = Config::from_env().unwrap();
            assert_eq!(config.port, 8017);
            assert_eq!(config.default_chat_model, "gpt-3.5-turbo-1106");
            assert_eq!(config.allowed_origin(), "http://localhost:5173");
            assert!(config.cloudinary.is_none());
        });
    }

    #[test]
    fn missing_required_key_is_a_config_error() {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", None::<&str>),
                ("GEMINI_API_KEY", Some("gm-test")),
                ("SUPABASE_URL", Some("https://project.supabase.co")),
                ("SUPABASE_API_KEY", Some("sb-test")),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("OPENAI_API_KEY"));
            },
        );
    }

    #[test]
    fn gpt_models_route_to_openai_and_others_to_groq() {
        with_minimal_env(|| {
            let config = Config::from_env().unwrap();
            let (base, key) = config.provider_for_model("gpt-3.5-turbo-1106").unwrap();
            assert!(base.contains("openai.com"));
            assert_eq!(key, "sk-test");

            let (base, key) = config.provider_for_model("mixtral-8x7b-32768").unwrap();
            assert!(base.contains("groq.com"));
            assert_eq!(key, "gq-test");
        });
    }

    #[test]
    fn partial_cloudinary_config_is_rejected() {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-test")),
                ("GEMINI_API_KEY", Some("gm-test")),
                ("SUPABASE_URL", Some("https://project.supabase.co")),
                ("SUPABASE_API_KEY", Some("sb-test")),
                ("CLOUDINARY_CLOUD_NAME", Some("demo")),
                ("CLOUDINARY_API_KEY", None::<&str>),
                ("CLOUDINARY_API_SECRET", None::<&str>),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("Cloudinary"));
            },
        );
    }
}
