use chatlink_rpc::{ChatRpcClient, RpcError, TransportConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationSummary {
    id: String,
    title: String,
    last_message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Startup code owns the environment lookup; the client only sees the value.
    let config = TransportConfig::from_env();
    println!("using {}", config.endpoint());

    let client = ChatRpcClient::new(config);

    match client
        .query::<_, Vec<ConversationSummary>>("conversation.list", &())
        .await
    {
        Ok(conversations) => {
            for conversation in conversations {
                println!(
                    "{} {}: {}",
                    conversation.id, conversation.title, conversation.last_message
                );
            }
        }
        Err(RpcError::Procedure { code, message, .. }) => {
            eprintln!("backend rejected the call ({code}): {message}");
        }
        Err(err) => {
            eprintln!(
                "call failed after {:?} attempt(s), kind {:?}: {err}",
                err.attempts(),
                err.kind()
            );
            return Err(err.into());
        }
    }

    Ok(())
}
