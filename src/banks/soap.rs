//! SOAP/XML partner. Login yields a session id that is echoed in every envelope.

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use super::{format_amount, BankAdapter, BankError, DebitOutcome, LinkVerification, PartnerClient};
use crate::domain::BankAccount;
use crate::secrets::PartnerCredentials;

const SERVICE_PATH: &str = "/services/CoreBanking";
const SUCCESS_CODE: &str = "000";

pub struct SoapAdapter {
    swift_code: String,
    client: PartnerClient,
    credentials: PartnerCredentials,
}

impl SoapAdapter {
    pub fn new(swift_code: String, client: PartnerClient, credentials: PartnerCredentials) -> Self {
        Self {
            swift_code,
            client,
            credentials,
        }
    }

    async fn invoke(&self, action: &str, body: String) -> Result<(bool, String), BankError> {
        let request = self
            .client
            .post(SERVICE_PATH)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", action)
            .body(envelope(&body));
        let response = self.client.execute(request).await?;
        Ok((response.is_ok(), response.body))
    }
}

#[async_trait]
impl BankAdapter for SoapAdapter {
    fn swift_code(&self) -> &str {
        &self.swift_code
    }

    async fn authenticate(&self) -> Result<String, BankError> {
        let body = format!(
            "<cb:Login><cb:UserName>{}</cb:UserName><cb:Password>{}</cb:Password></cb:Login>",
            xml_escape(self.credentials.require("username")?),
            xml_escape(self.credentials.require("password")?),
        );
        let (ok, reply) = self.invoke("Login", body).await?;

        match extract_tag(&reply, "SessionId") {
            Some(session) if ok && !session.is_empty() => Ok(session.to_string()),
            _ => Err(BankError::Rejected(
                extract_tag(&reply, "faultstring")
                    .unwrap_or("login failed")
                    .to_string(),
            )),
        }
    }

    async fn debit(
        &self,
        token: &str,
        reference: &str,
        amount: &BigDecimal,
        account: &BankAccount,
    ) -> Result<DebitOutcome, BankError> {
        let body = format!(
            "<cb:DebitAccount><cb:SessionId>{}</cb:SessionId><cb:Reference>{}</cb:Reference>\
             <cb:AccountNumber>{}</cb:AccountNumber><cb:Amount>{}</cb:Amount></cb:DebitAccount>",
            xml_escape(token),
            xml_escape(reference),
            xml_escape(&account.number),
            format_amount(amount),
        );
        let (ok, reply) = self.invoke("DebitAccount", body).await?;
        let message = extract_tag(&reply, "ResponseMessage")
            .or_else(|| extract_tag(&reply, "faultstring"))
            .unwrap_or_default()
            .to_string();

        if ok && extract_tag(&reply, "ResponseCode") == Some(SUCCESS_CODE) {
            let provider_reference = extract_tag(&reply, "TransactionId").map(str::to_string);
            Ok(DebitOutcome::success(message, provider_reference))
        } else {
            Ok(DebitOutcome::declined(message))
        }
    }

    async fn verify_account(&self, account: &BankAccount) -> Result<LinkVerification, BankError> {
        let token = self.authenticate().await?;
        let body = format!(
            "<cb:ValidateAccount><cb:SessionId>{}</cb:SessionId>\
             <cb:AccountNumber>{}</cb:AccountNumber></cb:ValidateAccount>",
            xml_escape(&token),
            xml_escape(&account.number),
        );
        let (ok, reply) = self.invoke("ValidateAccount", body).await?;

        if ok && extract_tag(&reply, "ResponseCode") == Some(SUCCESS_CODE) {
            Ok(LinkVerification::Verified)
        } else {
            Err(BankError::Rejected(
                extract_tag(&reply, "ResponseMessage")
                    .unwrap_or("account validation failed")
                    .to_string(),
            ))
        }
    }
}

fn envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         xmlns:cb=\"http://corebanking.partner/\">\
         <soapenv:Header/><soapenv:Body>{}</soapenv:Body></soapenv:Envelope>",
        body
    )
}

pub(crate) fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Text content of the first `<tag>` or `<prefix:tag>` element.
pub(crate) fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let needle = format!("{}>", tag);
    let mut from = 0;

    while let Some(pos) = xml[from..].find(&needle) {
        let start = from + pos;
        from = start + needle.len();

        let open = match xml[..start].rfind('<') {
            Some(open) => open,
            None => continue,
        };
        let prefix = &xml[open + 1..start];
        let is_opening = !prefix.starts_with('/')
            && (prefix.is_empty()
                || (prefix.ends_with(':')
                    && prefix[..prefix.len() - 1]
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')));
        if !is_opening {
            continue;
        }

        let end = xml[from..].find('<')? + from;
        return Some(xml[from..end].trim());
    }
    None
}
