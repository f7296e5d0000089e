//! Static per-provider mapping tables.
//!
//! These tables are the single source of truth for how standard fields map
//! to provider field names, which fields each provider requires, and which
//! payload structure each provider expects. Updating a provider's API
//! mapping happens here and nowhere else.

use crm_relay_provider::ProviderType;

/// How custom properties are placed into the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomFieldPlacement {
    /// At the payload root, next to the mapped fields.
    Root,
    /// At the root with a suffix appended to each key (Salesforce `__c`).
    Suffixed(&'static str),
    /// As a `fieldValues` array of `{field, value}` objects (ActiveCampaign).
    FieldArray,
    /// Under a `custom_attributes` object (Intercom).
    CustomAttributes,
    /// Under an `attributes` object (Brevo, Customer.io).
    Attributes,
}

/// The payload structure a provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    /// Klaviyo: `{attributes: {...}, properties: {...}}`.
    AttributesProperties,
    /// HubSpot: `{properties: {field: {value: ...}}}`.
    ValueProperties,
    /// Mailchimp: `{email_address, merge_fields: {...}}` with a nested
    /// `ADDRESS` object.
    MergeFields,
    /// A flat object, with custom properties placed per the tag.
    Flat(CustomFieldPlacement),
}

/// Standard-field to provider-field mapping for a provider.
#[must_use]
pub fn field_mapping(provider: ProviderType) -> &'static [(&'static str, &'static str)] {
    match provider {
        ProviderType::Klaviyo => &[
            ("email", "email"),
            ("first_name", "first_name"),
            ("last_name", "last_name"),
            ("phone", "phone_number"),
            ("company", "organization"),
            ("job_title", "title"),
            ("street_address", "address1"),
            ("street_address_2", "address2"),
            ("city", "city"),
            ("state", "region"),
            ("postal_code", "zip"),
            ("country", "country"),
            ("timezone", "timezone"),
        ],
        ProviderType::Salesforce => &[
            ("email", "Email"),
            ("first_name", "FirstName"),
            ("last_name", "LastName"),
            ("phone", "Phone"),
            ("company", "Company"),
            ("job_title", "Title"),
            ("department", "Department"),
            ("street_address", "MailingStreet"),
            ("city", "MailingCity"),
            ("state", "MailingState"),
            ("postal_code", "MailingPostalCode"),
            ("country", "MailingCountry"),
            ("website", "Website"),
        ],
        ProviderType::Creatio => &[
            ("email", "Email"),
            ("first_name", "GivenName"),
            ("last_name", "Surname"),
            ("phone", "MobilePhone"),
            ("company", "Account"),
            ("job_title", "JobTitle"),
            ("department", "Department"),
            ("street_address", "Address"),
            ("city", "City"),
            ("state", "Region"),
            ("postal_code", "Zip"),
            ("country", "Country"),
            ("website", "Web"),
        ],
        ProviderType::Hubspot => &[
            ("email", "email"),
            ("first_name", "firstname"),
            ("last_name", "lastname"),
            ("phone", "phone"),
            ("company", "company"),
            ("job_title", "jobtitle"),
            ("street_address", "address"),
            ("city", "city"),
            ("state", "state"),
            ("postal_code", "zip"),
            ("country", "country"),
            ("website", "website"),
        ],
        ProviderType::Mailchimp => &[
            ("email", "email_address"),
            ("first_name", "FNAME"),
            ("last_name", "LNAME"),
            ("phone", "PHONE"),
            ("company", "COMPANY"),
            ("street_address", "ADDRESS.addr1"),
            ("street_address_2", "ADDRESS.addr2"),
            ("city", "ADDRESS.city"),
            ("state", "ADDRESS.state"),
            ("postal_code", "ADDRESS.zip"),
            ("country", "ADDRESS.country"),
        ],
        ProviderType::Activecampaign => &[
            ("email", "email"),
            ("first_name", "firstName"),
            ("last_name", "lastName"),
            ("phone", "phone"),
            ("company", "account"),
            ("job_title", "jobTitle"),
        ],
        ProviderType::Sendinblue => &[
            ("email", "email"),
            ("first_name", "FIRSTNAME"),
            ("last_name", "LASTNAME"),
            ("phone", "SMS"),
            ("company", "COMPANY"),
        ],
        ProviderType::Zoho => &[
            ("email", "Email"),
            ("first_name", "First_Name"),
            ("last_name", "Last_Name"),
            ("phone", "Phone"),
            ("company", "Company"),
            ("job_title", "Designation"),
            ("department", "Department"),
            ("street_address", "Mailing_Street"),
            ("city", "Mailing_City"),
            ("state", "Mailing_State"),
            ("postal_code", "Mailing_Zip"),
            ("country", "Mailing_Country"),
            ("website", "Website"),
        ],
        ProviderType::Pipedrive => &[
            ("email", "email"),
            ("first_name", "first_name"),
            ("last_name", "last_name"),
            ("phone", "phone"),
            ("company", "org_name"),
        ],
        ProviderType::Intercom => &[
            ("email", "email"),
            // Intercom has a single name field.
            ("first_name", "name"),
            ("phone", "phone"),
            ("company", "company.name"),
            ("job_title", "custom_attributes.job_title"),
            ("city", "custom_attributes.city"),
            ("country", "custom_attributes.country"),
        ],
        ProviderType::Customerio => &[
            ("email", "email"),
            ("first_name", "first_name"),
            ("last_name", "last_name"),
            ("phone", "phone"),
            ("company", "company"),
            ("job_title", "job_title"),
        ],
    }
}

/// Standard fields a provider requires to be present and non-empty.
#[must_use]
pub fn required_fields(provider: ProviderType) -> &'static [&'static str] {
    match provider {
        // Lead/Contact objects require a last name.
        ProviderType::Salesforce | ProviderType::Zoho => &["email", "last_name"],
        _ => &["email"],
    }
}

/// The payload structure for a provider.
#[must_use]
pub fn structure(provider: ProviderType) -> Structure {
    match provider {
        ProviderType::Klaviyo => Structure::AttributesProperties,
        ProviderType::Hubspot => Structure::ValueProperties,
        ProviderType::Mailchimp => Structure::MergeFields,
        ProviderType::Salesforce => Structure::Flat(CustomFieldPlacement::Suffixed("__c")),
        ProviderType::Activecampaign => Structure::Flat(CustomFieldPlacement::FieldArray),
        ProviderType::Intercom => Structure::Flat(CustomFieldPlacement::CustomAttributes),
        ProviderType::Sendinblue | ProviderType::Customerio => {
            Structure::Flat(CustomFieldPlacement::Attributes)
        }
        ProviderType::Creatio | ProviderType::Zoho | ProviderType::Pipedrive => {
            Structure::Flat(CustomFieldPlacement::Root)
        }
    }
}

/// Looks up the provider field name for a standard field.
#[must_use]
pub fn mapped_field(provider: ProviderType, standard_field: &str) -> Option<&'static str> {
    field_mapping(provider)
        .iter()
        .find(|(standard, _)| *standard == standard_field)
        .map(|(_, mapped)| *mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_has_a_mapping_table() {
        for provider in ProviderType::ALL {
            assert!(
                !field_mapping(provider).is_empty(),
                "no mapping table for {provider}"
            );
        }
    }

    #[test]
    fn every_provider_maps_email() {
        for provider in ProviderType::ALL {
            assert!(
                mapped_field(provider, "email").is_some(),
                "{provider} does not map email"
            );
        }
    }

    #[test]
    fn required_fields_always_include_email() {
        for provider in ProviderType::ALL {
            assert!(required_fields(provider).contains(&"email"));
        }
    }

    #[test]
    fn salesforce_and_zoho_require_last_name() {
        assert!(required_fields(ProviderType::Salesforce).contains(&"last_name"));
        assert!(required_fields(ProviderType::Zoho).contains(&"last_name"));
        assert!(!required_fields(ProviderType::Klaviyo).contains(&"last_name"));
    }

    #[test]
    fn klaviyo_renames() {
        assert_eq!(mapped_field(ProviderType::Klaviyo, "phone"), Some("phone_number"));
        assert_eq!(
            mapped_field(ProviderType::Klaviyo, "company"),
            Some("organization")
        );
        assert_eq!(mapped_field(ProviderType::Klaviyo, "state"), Some("region"));
    }

    #[test]
    fn structure_tags() {
        assert_eq!(
            structure(ProviderType::Salesforce),
            Structure::Flat(CustomFieldPlacement::Suffixed("__c"))
        );
        assert_eq!(
            structure(ProviderType::Hubspot),
            Structure::ValueProperties
        );
        assert_eq!(structure(ProviderType::Mailchimp), Structure::MergeFields);
    }
}
