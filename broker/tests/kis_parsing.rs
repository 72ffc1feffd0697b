//! Tests for open-API response parsing; no live connection needed.

#[cfg(feature = "kis")]
mod kis_tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use folio::Exchange;
    use folio_broker::BrokerError;
    use folio_broker::Reply;
    use folio_broker::kis::types::*;
    use rust_decimal_macros::dec;

    // ========================================================================
    // Reply classification
    // ========================================================================

    #[test]
    fn expired_token_body_on_error_status() {
        let body = r#"{"rt_cd":"1","msg_cd":"EGW00123","msg1":"token expired"}"#;
        assert_eq!(classify(500, body).unwrap(), Reply::Expired);
    }

    #[test]
    fn invalid_token_code_is_also_expired() {
        let body = r#"{"rt_cd":"1","msg_cd":"EGW00121","msg1":"invalid token"}"#;
        assert_eq!(classify(200, body).unwrap(), Reply::Expired);
    }

    #[test]
    fn error_status_without_json_is_connection_error() {
        let err = classify(502, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, BrokerError::Connection(_)));
    }

    #[test]
    fn success_status_with_garbage_is_invalid_payload() {
        let err = classify(200, "not json").unwrap_err();
        assert!(matches!(err, BrokerError::InvalidPayload(_)));
    }

    #[test]
    fn business_rejection_stays_data() {
        let body = r#"{"rt_cd":"1","msg_cd":"APBK0919","msg1":"insufficient cash"}"#;
        let env = classify(200, body).unwrap().data().unwrap();
        assert!(!env.is_success());
        let ack = env.into_ack();
        assert_eq!(ack.message_code, "APBK0919");
        assert!(!ack.is_success());
        assert_eq!(ack.order_no, None);
    }

    // ========================================================================
    // Orders
    // ========================================================================

    #[test]
    fn order_ack_carries_order_number() {
        let body = r#"{
            "rt_cd": "0",
            "msg_cd": "APBK0013",
            "msg1": "order accepted",
            "output": { "KRX_FWDG_ORD_ORGNO": "91252", "ODNO": "0000117057", "ORD_TMD": "121052" }
        }"#;
        let ack = classify(200, body).unwrap().data().unwrap().into_ack();
        assert!(ack.is_success());
        assert_eq!(ack.order_no.as_deref(), Some("0000117057"));
        assert_eq!(ack.raw["output"]["ORD_TMD"], "121052");
    }

    // ========================================================================
    // Quotes
    // ========================================================================

    #[test]
    fn domestic_price_output() {
        let body = r#"{"rt_cd":"0","msg_cd":"MCA00000","msg1":"ok",
            "output":{"stck_prpr":"71000","prdy_vrss":"-500"}}"#;
        let env = classify(200, body).unwrap().data().unwrap();
        let out: DomesticPrice = env.output("output").unwrap().unwrap();
        assert_eq!(parse_decimal(&out.stck_prpr), Some(dec!(71000)));
    }

    #[test]
    fn foreign_price_empty_last_means_no_listing() {
        let body = r#"{"rt_cd":"0","msg_cd":"","msg1":"","output":{"last":"","curr":""}}"#;
        let env = classify(200, body).unwrap().data().unwrap();
        let out: ForeignPrice = env.output("output").unwrap().unwrap();
        assert_eq!(parse_decimal(&out.last), None);
    }

    #[test]
    fn missing_output_is_none() {
        let body = r#"{"rt_cd":"0","msg_cd":"","msg1":""}"#;
        let env = classify(200, body).unwrap().data().unwrap();
        assert!(env.output::<DomesticPrice>("output").unwrap().is_none());
    }

    #[test]
    fn daily_rows_pick_close_on_or_before_date() {
        let body = r#"{"rt_cd":"0","output2":[
            {"xymd":"20240105","clos":"470.10"},
            {"xymd":"20240104","clos":"467.28"},
            {"xymd":"20240103","clos":"468.79"}
        ]}"#;
        let env = classify(200, body).unwrap().data().unwrap();
        let rows: Vec<ForeignDaily> = env.output("output2").unwrap().unwrap();
        // Saturday 6th falls back to Friday 5th; Thursday 4th is exact.
        let sat = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let thu = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let pairs: Vec<_> = rows.into_iter().map(|r| (r.xymd, r.clos)).collect();
        assert_eq!(close_on_or_before(pairs.clone(), sat), Some(dec!(470.10)));
        assert_eq!(close_on_or_before(pairs.clone(), thu), Some(dec!(467.28)));
        let before = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(close_on_or_before(pairs, before), None);
    }

    // ========================================================================
    // Balances
    // ========================================================================

    #[test]
    fn balance_rows_become_entries() {
        let dom: DomesticHolding = serde_json::from_str(
            r#"{"pdno":"005930","prdt_name":"Samsung Electronics","hldg_qty":"12"}"#,
        )
        .unwrap();
        let entry = dom.into_entry();
        assert_eq!(entry.ticker, "005930");
        assert_eq!(entry.quantity, dec!(12));
        assert_eq!(entry.exchange, None);

        let foreign: ForeignHolding = serde_json::from_str(
            r#"{"ovrs_pdno":"SPY","ovrs_item_name":"SPDR S&P 500",
                "ovrs_cblc_qty":"3","ovrs_excg_cd":"NYSE"}"#,
        )
        .unwrap();
        let entry = foreign.into_entry();
        assert_eq!(entry.quantity, dec!(3));
        assert_eq!(entry.exchange, Some(Exchange::Nyse));
    }

    // ========================================================================
    // Token issuance
    // ========================================================================

    #[test]
    fn token_response_sets_absolute_expiry() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token":"eyJ0eXAi","token_type":"Bearer","expires_in":86400,
                "access_token_token_expired":"2024-01-02 09:00:00"}"#,
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let cred = resp.into_credential(now).unwrap();
        assert_eq!(cred.token, "eyJ0eXAi");
        assert_eq!(cred.expires_at, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn token_error_is_auth_failure() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"error_code":"EGW00103","error_description":"invalid AppKey"}"#,
        )
        .unwrap();
        let err = resp.into_credential(Utc::now()).unwrap_err();
        assert!(matches!(err, BrokerError::Auth(ref m) if m.contains("EGW00103")));
    }

    #[test]
    fn product_type_codes() {
        assert_eq!(product_type_code(Exchange::Nasdaq), "512");
        assert_eq!(product_type_code(Exchange::Nyse), "513");
        assert_eq!(product_type_code(Exchange::Amex), "529");
    }
}
